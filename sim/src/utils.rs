/// Parse a hex literal with or without the `0x` prefix.
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::parse_hex;

    #[test]
    fn parse_hex_literals() {
        assert_eq!(parse_hex("6808"), Some(0x6808));
        assert_eq!(parse_hex("0x8000100"), Some(0x800_0100));
        assert_eq!(parse_hex("zz"), None);
    }
}

use ansi_term::Colour;
use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use m4_time::{parse_listing, BlockTimer, BlockTimerOption, TargetDesc};

// Cortex-M4F basic block timing analyzer
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the input listing (one `address: encoding` per line, blank
    /// lines between basic blocks)
    input: String,

    /// Record instructions without cycle timing info in `<input>.log`
    #[arg(long)]
    log: bool,

    /// Print each block's execution graph
    #[arg(long)]
    dump_graph: bool,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose.log_level() {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    };
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;
    let blocks = parse_listing(&content)?;

    let opt = BlockTimerOption::default().set_write_log(args.log);
    let mut timer = BlockTimer::new(TargetDesc::m4f(), std::path::Path::new(&args.input), opt)?;

    let mut total = 0u64;
    for (i, seq) in blocks.iter().enumerate() {
        if args.dump_graph {
            let graph = timer.build_graph(seq)?;
            println!("{}", Colour::Yellow.bold().paint(format!("block {}", i)));
            graph.graph().dump(&mut std::io::stdout().lock())?;
        }
        let time = timer.time_block(seq)?;
        total += time.cycles;
        println!(
            "{} {:>6} cycles  ({} instructions, {} nodes, {} edges)",
            Colour::Green.paint(format!("block {:>3}", i)),
            time.cycles,
            seq.len(),
            time.nodes,
            time.edges,
        );
    }
    println!("total {} cycles over {} blocks", total, blocks.len());

    if args.log && !timer.unknown_inst_addrs().is_empty() {
        eprintln!(
            "{}: {} instruction(s) without timing info, see `{}.log`",
            Colour::Yellow.paint("warning"),
            timer.unknown_inst_addrs().len(),
            args.input
        );
    }
    Ok(())
}

use clap::Parser;
use std::path::PathBuf;

use cairn::pass::PassKind;

/// Lower packet parser state machines to explicit bit ranges
#[derive(Parser)]
#[clap(author, version, about)]
#[clap(after_help = AFTER_HELP)]
struct Cli {
    /// Path to the program to lower, or `-` to read from stdin
    #[clap(name = "INPUT")]
    input: PathOrStdin,
    /// Write the lowered program to this file instead of stdout
    #[clap(short = 'o', long = "output", name = "OUTFILE")]
    output: Option<PathBuf>,
    /// Precede each node of the output with a comment naming its kind
    #[clap(long = "show-ir")]
    show_ir: bool,
    /// Passes to run, in order [default: lower version]
    #[clap(long = "pass", name = "PASS", value_enum)]
    passes: Vec<PassKind>,
}

const AFTER_HELP: &str = "\
Examples:

  $ cairn parser.pir
  $ cairn --pass version --pass lower -o lowered.pir parser.pir

Logging is controlled by the `CAIRN_LOG` environment variable, falling back to
`RUST_LOG`, using the `env_logger` filter syntax.
";

#[derive(Clone, Debug)]
enum PathOrStdin {
    StdIn,
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(src: &str) -> Result<PathOrStdin, std::convert::Infallible> {
        match src {
            "-" => Ok(PathOrStdin::StdIn),
            _ => Ok(PathOrStdin::Path(PathBuf::from(src))),
        }
    }
}

fn unwrap_or_exit<T>(option: Option<T>) -> T {
    option.unwrap_or_else(|| std::process::exit(cairn::Status::Error.exit_code()))
}

fn load_file_or_exit(driver: &mut cairn::Driver, file: PathOrStdin) -> cairn::source::FileId {
    unwrap_or_exit(match file {
        PathOrStdin::StdIn => driver.load_source("<stdin>".to_owned(), std::io::stdin()),
        PathOrStdin::Path(path) => driver.load_source_path(&path),
    })
}

const MAX_PRETTY_WIDTH: usize = 80;

fn get_pretty_width() -> usize {
    let term_width = termsize::get().map_or(usize::MAX, |size| usize::from(size.cols));
    std::cmp::min(term_width, MAX_PRETTY_WIDTH)
}

const DEFAULT_LOG_FILTER: &str = "warn";

fn init_logger() {
    let filters = std::env::var("CAIRN_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());

    env_logger::Builder::new()
        .parse_filters(&filters)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() -> ! {
    init_logger();

    let cli = Cli::parse();

    let mut driver = cairn::Driver::new();
    driver.install_panic_hook();
    driver.set_emit_width(get_pretty_width());
    driver.set_show_ir(cli.show_ir);
    driver.set_passes(match cli.passes.is_empty() {
        true => PassKind::DEFAULT,
        false => cli.passes.as_slice(),
    });

    if let Some(path) = &cli.output {
        unwrap_or_exit(driver.set_emit_path(path));
    }

    let file_id = load_file_or_exit(&mut driver, cli.input);
    let status = driver.lower_and_emit(file_id);

    std::process::exit(status.exit_code());
}

use std::path::PathBuf;

use postcell::app::RunOptions;

const HELP: &str = "Postcell - bind a feed through recycled list rows and print them.\n\nUsage: postcell [OPTIONS] <FEED.json>\n\n  --config <PATH>      Read configuration from PATH\n  --cells <N>          Number of recycled rows (default 3)\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message";

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(err) = postcell::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args<I>(args: I) -> Result<Option<RunOptions>, String>
where
    I: Iterator<Item = String>,
{
    let mut options = RunOptions::default();
    let mut feed_path = None;
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Postcell {}", postcell::VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(None);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--cells" => {
                let value = args.next().ok_or("--cells needs a number")?;
                let count = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid --cells value {value:?}"))?;
                options.pool_size = Some(count);
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option {other}"));
            }
            path => feed_path = Some(PathBuf::from(path)),
        }
    }

    options.feed_path = feed_path.ok_or("missing feed file")?;
    Ok(Some(options))
}

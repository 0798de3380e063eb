use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SONGFEED_LOG";

fn main() {
    let options = match handle_cli_flags() {
        Some(options) => options,
        None => return,
    };

    init_tracing();

    if let Err(err) = songfeed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag has already been handled and the process should
/// exit.
fn handle_cli_flags() -> Option<songfeed::app::Options> {
    let mut options = songfeed::app::Options::default();
    let mut args = std::env::args().skip(1);
    let mut saw_flag = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("songfeed {}", songfeed::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "songfeed - share, search and discuss song links from the terminal.\n\n  --version, -V          Show version and exit\n  --help,    -h          Show this help message\n  --classify <url>       Print the song reference for a link and exit\n  --offline              Browse sample data without a backend\n  --config <path>        Read configuration from <path>\n\nSet {LOG_ENV}=debug for diagnostics on stderr."
                );
                saw_flag = true;
            }
            "--classify" => {
                saw_flag = true;
                match args.next() {
                    Some(url) => {
                        let song = songfeed::link::classify(&url);
                        println!("{}\t{}", song.provider(), song.id());
                        println!("{}", song.display_url());
                        if let Some(embed) = song.embed_url() {
                            println!("{embed}");
                        }
                    }
                    None => {
                        eprintln!("--classify needs a URL");
                        std::process::exit(2);
                    }
                }
            }
            "--offline" => options.offline = true,
            "--config" => match args.next() {
                Some(path) => options.config_file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("--config needs a path");
                    std::process::exit(2);
                }
            },
            _ => {}
        }
    }

    if saw_flag {
        None
    } else {
        Some(options)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

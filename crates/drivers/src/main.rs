mod config;
mod logging;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use config::AppConfig;
use pixseek_adapters::{present_metrics, present_result_row, HttpSearchBackend, MockSearchBackend};
use pixseek_application::SearchBackend;
use pixseek_domain::{ImageFormat, SelectedImage};

fn main() -> ExitCode {
    logging::init_logging();
    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::from_env();

    match run_command(parse_command(&args), &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError::Usage(msg)) => {
            eprintln!("{msg}");
            print_usage();
            ExitCode::from(2)
        }
        Err(CommandError::Runtime(msg)) => {
            eprintln!("{msg}");
            ExitCode::from(1)
        }
    }
}

#[derive(Debug, Clone)]
enum Command {
    Ui,
    Search { file: String },
    Metrics { file: String },
}

#[derive(Debug, Clone)]
enum CommandError {
    Usage(String),
    Runtime(String),
}

fn parse_command(args: &[String]) -> Result<Command, CommandError> {
    if args.len() <= 1 {
        return Ok(Command::Ui);
    }

    match args[1].as_str() {
        "ui" => Ok(Command::Ui),
        "search" => {
            if args.len() < 3 {
                return Err(CommandError::Usage("missing image file path".to_string()));
            }
            Ok(Command::Search {
                file: args[2].clone(),
            })
        }
        "metrics" => {
            if args.len() < 3 {
                return Err(CommandError::Usage("missing image file path".to_string()));
            }
            Ok(Command::Metrics {
                file: args[2].clone(),
            })
        }
        other => Err(CommandError::Usage(format!("unknown command: {other}"))),
    }
}

fn run_command(
    command: Result<Command, CommandError>,
    config: &AppConfig,
) -> Result<(), CommandError> {
    match command? {
        Command::Ui => ui::launch_window(config).map_err(CommandError::Runtime),
        Command::Search { file } => {
            let results = run_headless_search(&file, config)?;
            if results.is_empty() {
                println!("no similar images found");
                return Ok(());
            }
            for (index, reference) in results.iter().enumerate() {
                println!("{}", present_result_row(index, reference));
            }
            Ok(())
        }
        Command::Metrics { file } => {
            // One-shot search through the full pipeline, then its counters.
            let metrics = run_piped_search(&file, config)?;
            println!("{}", present_metrics(&metrics));
            Ok(())
        }
    }
}

fn run_headless_search(
    file: &str,
    config: &AppConfig,
) -> Result<Vec<pixseek_domain::ResultImageRef>, CommandError> {
    let image = read_candidate(Path::new(file))?;
    let backend = build_backend(config)?;
    backend
        .search_similar(&image)
        .map_err(|failure| CommandError::Runtime(format!("search failed: {failure}")))
}

fn run_piped_search(
    file: &str,
    config: &AppConfig,
) -> Result<pixseek_domain::SearchMetrics, CommandError> {
    let image = read_candidate(Path::new(file))?;
    let mut session = ui::build_search_session(config).map_err(CommandError::Runtime)?;

    let accepted = session
        .select_image(&image.name, image.format.mime_type(), image.bytes)
        .map_err(|error| CommandError::Runtime(error.to_string()))?;
    if !accepted {
        return Err(CommandError::Usage(format!("unsupported image type: {file}")));
    }

    if let Some(notice) = session
        .trigger_search()
        .map_err(|error| CommandError::Runtime(error.to_string()))?
    {
        return Err(CommandError::Runtime(notice.detail));
    }
    while session.is_searching() {
        if let Some(notice) = session
            .poll()
            .map_err(|error| CommandError::Runtime(error.to_string()))?
        {
            println!("{}: {}", notice.title, notice.detail);
        }
        std::thread::sleep(std::time::Duration::from_millis(25));
    }

    session
        .metrics()
        .map_err(|error| CommandError::Runtime(error.to_string()))
}

fn build_backend(config: &AppConfig) -> Result<Box<dyn SearchBackend>, CommandError> {
    if config.use_mock_backend {
        return Ok(Box::new(MockSearchBackend::new()));
    }
    let backend = HttpSearchBackend::new(config.base_url.as_str())
        .map_err(|error| CommandError::Runtime(error.to_string()))?;
    Ok(Box::new(backend))
}

/// Reads a picker-style candidate from disk, deriving the declared type from
/// the extension. Unsupported extensions are a usage error on the CLI.
fn read_candidate(path: &Path) -> Result<SelectedImage, CommandError> {
    let Some(format) = ImageFormat::from_path(path) else {
        return Err(CommandError::Usage(format!(
            "unsupported image type: {}",
            path.display()
        )));
    };
    let bytes = std::fs::read(path)
        .map_err(|error| CommandError::Runtime(format!("failed to read {}: {error}", path.display())))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    Ok(SelectedImage::new(name, format, bytes))
}

fn print_usage() {
    println!("usage:");
    println!("  pixseek ui");
    println!("  pixseek search <image-file>");
    println!("  pixseek metrics <image-file>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_launches_the_ui() {
        let args = vec!["pixseek".to_string()];
        let command = parse_command(&args).expect("default should parse");
        assert!(matches!(command, Command::Ui));
    }

    #[test]
    fn parse_search_command() {
        let args = vec![
            "pixseek".to_string(),
            "search".to_string(),
            "photo.jpg".to_string(),
        ];
        let command = parse_command(&args).expect("search should parse");
        assert!(matches!(command, Command::Search { .. }));
    }

    #[test]
    fn search_without_a_file_is_a_usage_error() {
        let args = vec!["pixseek".to_string(), "search".to_string()];
        assert!(matches!(
            parse_command(&args),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn unknown_command_is_a_usage_error() {
        let args = vec!["pixseek".to_string(), "frobnicate".to_string()];
        assert!(matches!(
            parse_command(&args),
            Err(CommandError::Usage(_))
        ));
    }

    #[test]
    fn read_candidate_accepts_supported_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("query.png");
        std::fs::write(&path, [1_u8, 2, 3]).expect("write file");

        let image = read_candidate(&path).expect("png path is accepted");
        assert_eq!(image.name, "query.png");
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!(image.byte_size(), 3);
    }

    #[test]
    fn read_candidate_rejects_unsupported_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").expect("write file");

        assert!(matches!(
            read_candidate(&path),
            Err(CommandError::Usage(_))
        ));
    }
}

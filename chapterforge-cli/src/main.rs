use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

mod json;
mod log_fmt;

/// Author or inspect chaptered M4A/MP4 audio files.
#[derive(Parser, Debug)]
#[command(name = "chapterforge", disable_version_flag = true)]
struct Args {
    /// Source audio (.aac/.m4a/.mp4), or an existing file to read back.
    input: Option<PathBuf>,

    /// Chapter JSON (write mode only).
    chapters_json: Option<PathBuf>,

    /// Destination file (write mode only).
    output: Option<PathBuf>,

    /// Use the fast-start layout (moov before mdat).
    #[arg(long)]
    faststart: bool,

    /// Read mode only: export each chapter image into this directory.
    #[arg(long, value_name = "DIR")]
    export_jpegs: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(short = 'v', long = "version")]
    version: bool,
}

fn init_logging(level: &str) {
    let filter = match level {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .format(log_fmt::formatter)
        .init();
}

fn run_write(input: &PathBuf, chapters_json: &PathBuf, output: &PathBuf, faststart: bool) -> ExitCode {
    let loaded = match json::load_chapters(chapters_json) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("chapterforge: failed to mux m4a: {e}");
            return ExitCode::from(1);
        }
    };

    let extra_tracks: Vec<chapterforge::ExtraTextTrack<'_>> = if loaded.urls.is_empty() {
        Vec::new()
    } else {
        vec![chapterforge::ExtraTextTrack {
            handler_name: "Chapter URLs",
            samples: &loaded.urls,
        }]
    };

    let status = chapterforge::write_mp4(
        input,
        &loaded.titles,
        &extra_tracks,
        &loaded.images,
        Some(&loaded.metadata),
        output,
        faststart,
    );

    if status.ok {
        println!("Wrote: {}", output.display());
        ExitCode::from(0)
    } else {
        eprintln!("chapterforge: failed to mux m4a: {}", status.message);
        ExitCode::from(1)
    }
}

fn run_read(input: &PathBuf, export_jpegs: Option<&PathBuf>) -> ExitCode {
    let result = chapterforge::read_m4a(input);

    if let Some(dir) = export_jpegs {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("chapterforge: cannot create {}: {e}", dir.display());
            return ExitCode::from(1);
        }
        for (i, image) in result.images.iter().enumerate() {
            let path = dir.join(format!("chapter_{i:02}.jpg"));
            if let Err(e) = std::fs::write(&path, &image.data) {
                eprintln!("chapterforge: cannot write {}: {e}", path.display());
                return ExitCode::from(1);
            }
        }
    }

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("chapterforge: failed to serialize read result: {e}");
            return ExitCode::from(1);
        }
    }

    if result.status.ok {
        ExitCode::from(0)
    } else {
        ExitCode::from(1)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.version {
        println!("chapterforge {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::from(0);
    }

    init_logging(&args.log_level);
    log::debug!("{args:?}");

    match (&args.input, &args.chapters_json, &args.output) {
        (Some(input), None, None) => run_read(input, args.export_jpegs.as_ref()),
        (Some(input), Some(chapters_json), Some(output)) => {
            run_write(input, chapters_json, output, args.faststart)
        }
        _ => {
            eprintln!(
                "usage: chapterforge <input> [--export-jpegs DIR] | chapterforge <input> <chapters.json> <output.m4a> [--faststart]"
            );
            ExitCode::from(2)
        }
    }
}

use anyhow::{anyhow, bail, Context, Result};
use reelcap::{
    ExportFormat, ImageSequenceSurface, Quality, ReelcapConfig, SessionManager,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const USAGE: &str = "Usage: reelcap-cli <command> [args]

Commands:
  export <png-dir> [--format gif|mp4] [--quality low|medium|high] [--fps <n>]
                   [--duration-ms <ms>] [--out <dir>] [--config <file>] [--json]
  quality-table [--json]
  init-config [path]";

fn main() -> Result<()> {
    reelcap::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "export" => cmd_export(&args),
        "quality-table" => cmd_quality_table(&args),
        "init-config" => cmd_init_config(&args),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn flag_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn cmd_export(args: &[String]) -> Result<()> {
    // export <png-dir> [--format] [--quality] [--fps] [--duration-ms] [--out] [--config] [--json]
    let mut input_dir = None;
    let mut format = None;
    let mut quality = None;
    let mut fps = None;
    let mut duration_ms: u64 = 3000;
    let mut out_dir = None;
    let mut config_path = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--format" => {
                let value = flag_value(args, &mut i, "--format")?;
                format = Some(
                    ExportFormat::parse(value)
                        .ok_or_else(|| anyhow!("unknown format '{}'", value))?,
                );
            }
            "--quality" => {
                let value = flag_value(args, &mut i, "--quality")?;
                quality =
                    Some(Quality::parse(value).ok_or_else(|| anyhow!("unknown quality '{}'", value))?);
            }
            "--fps" => {
                fps = Some(
                    flag_value(args, &mut i, "--fps")?
                        .parse::<u32>()
                        .context("--fps must be a number")?,
                );
            }
            "--duration-ms" => {
                duration_ms = flag_value(args, &mut i, "--duration-ms")?
                    .parse()
                    .context("--duration-ms must be a number")?;
            }
            "--out" => out_dir = Some(PathBuf::from(flag_value(args, &mut i, "--out")?)),
            "--config" => config_path = Some(PathBuf::from(flag_value(args, &mut i, "--config")?)),
            "--json" => json = true,
            other if other.starts_with("--") => bail!("unknown option {}", other),
            other => {
                if input_dir.is_some() {
                    bail!("unexpected argument {}", other);
                }
                input_dir = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    let input_dir = input_dir.ok_or_else(|| anyhow!("export needs a directory of PNG frames"))?;

    let mut config = match config_path {
        Some(path) => ReelcapConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ReelcapConfig::load_or_default(),
    };
    if let Some(format) = format {
        config.encoding.format = format;
    }
    if let Some(quality) = quality {
        config.encoding.quality = quality;
    }
    if let Some(fps) = fps {
        config.capture.frame_rate = fps;
    }
    config.validate()?;

    let surface = ImageSequenceSurface::from_dir(&input_dir)
        .with_context(|| format!("reading frames from {}", input_dir.display()))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let manager = SessionManager::new();
    let token = manager
        .start(Box::new(surface), config.export_request())?
        .ok_or_else(|| anyhow!("another export is already running"))?;

    let deadline = Instant::now() + Duration::from_millis(duration_ms);
    while Instant::now() < deadline && !interrupted.load(Ordering::SeqCst) {
        if !manager.phase().is_active() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    if interrupted.load(Ordering::SeqCst) {
        log::info!("Interrupted; stopping capture early");
    }

    let blob = manager.stop(&token)?;
    let out_dir = out_dir.unwrap_or_else(|| config.output_directory());
    let path = blob.write_to_dir(&out_dir)?;

    if json {
        let snapshot = manager
            .snapshot()
            .ok_or_else(|| anyhow!("session vanished before reporting"))?;
        let report = serde_json::json!({
            "path": path,
            "mime_type": blob.mime_type,
            "bytes": blob.len(),
            "session": snapshot,
        });
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "{} ({}, {} frames, {} bytes)",
            path.display(),
            blob.mime_type,
            manager.frame_count(),
            blob.len()
        );
    }
    Ok(())
}

fn cmd_quality_table(args: &[String]) -> Result<()> {
    if args.contains(&"--json".to_string()) {
        let rows: Vec<_> = Quality::ALL
            .iter()
            .map(|q| serde_json::json!({ "quality": q, "params": q.params() }))
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        println!("{:<8} {:>12} {:>12} {:>8}  profile", "quality", "bitrate", "pixel_ratio", "palette");
        for q in Quality::ALL {
            let p = q.params();
            println!(
                "{:<8} {:>12} {:>12.1} {:>8}  {:?}",
                q.as_str(),
                p.bitrate,
                p.pixel_ratio,
                p.palette_size,
                p.profile
            );
        }
    }
    Ok(())
}

fn cmd_init_config(args: &[String]) -> Result<()> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(ReelcapConfig::default_path);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    ReelcapConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

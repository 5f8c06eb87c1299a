//! Application runner logic
//!
//! Handles the different ways to run fontlive: one-shot compiles,
//! interpolation, coordinate mapping and the watch loop.

use crate::core::cli::{parse_design_location, CliArgs, Command};
use crate::core::config::settings::WATCH_POLL_INTERVAL;
use crate::core::config::{ConfigFile, PipelineSettings};
use crate::engine::{engine_factory, CompilerProxy, FontcEngine};
use crate::font_source::axes::{
    designspace_location_to_user, normalize_location, parse_location, user_location_to_designspace,
};
use crate::font_source::{DesignLocation, FontSource, UserLocation};
use crate::logging;
use crate::pipeline::{
    AutoCompileEvent, AutoCompiler, CompilationQueue, DocumentRegistry, FontDocument,
    InterpolationManager,
};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Run fontlive with the given CLI arguments.
/// Handles special CLI flags and delegates to the command runners.
pub fn run_app(cli_args: CliArgs) -> Result<()> {
    if cli_args.new_config {
        return ConfigFile::initialize_config_directory()
            .context("Failed to initialize config directory");
    }

    cli_args.validate().map_err(|e| anyhow!(e))?;
    let command = cli_args
        .command
        .clone()
        .ok_or_else(|| anyhow!("No command given"))?;

    let _logging = match logging::init_logging(cli_args.verbose) {
        Ok(guard) => {
            debug!("Logging to {}", guard.log_file().display());
            Some(guard)
        }
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            None
        }
    };

    let config = ConfigFile::load();
    let settings = cli_args.settings(config.as_ref());

    if let Command::Map { source, at, reverse } = &command {
        return run_map(source, at, *reverse);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run_command(command, settings))
}

async fn run_command(command: Command, settings: PipelineSettings) -> Result<()> {
    match command {
        Command::Compile {
            source,
            target,
            subset,
            output,
        } => {
            let target = target.unwrap_or_else(|| settings.default_target.clone());
            run_compile(&source, &target, subset, &output, &settings).await
        }
        Command::Interpolate {
            source,
            glyphs,
            at,
            designspace,
            svg,
        } => run_interpolate(&source, &glyphs, &at, designspace, svg, &settings).await,
        Command::Watch { source, output, .. } => run_watch(&source, &output, &settings).await,
        Command::Map { source, at, reverse } => run_map(&source, &at, reverse),
    }
}

/// Start the worker with a fontc engine and wait for it to be ready.
async fn start_engine(settings: &PipelineSettings) -> Result<CompilerProxy> {
    let fontc = settings.fontc_path.clone();
    let proxy = CompilerProxy::new(
        engine_factory(move || FontcEngine::new(fontc.clone())),
        settings.engine.clone(),
    );
    let version = proxy.initialize().await?;
    info!("Using {}", version);
    Ok(proxy)
}

async fn run_compile(
    source: &Path,
    target: &str,
    subset: Option<Vec<String>>,
    output: &Path,
    settings: &PipelineSettings,
) -> Result<()> {
    let font = FontSource::load(source)?;
    let proxy = start_engine(settings).await?;
    let queue = CompilationQueue::new(proxy.clone());

    let compiled = queue.compile(font.to_json()?, target, subset).await;
    proxy.teardown();
    let compiled = compiled?;

    tokio::fs::write(output, &compiled.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} ({} bytes, compiled in {:?})",
        output.display(),
        compiled.bytes.len(),
        compiled.duration
    );
    Ok(())
}

async fn run_interpolate(
    source: &Path,
    glyphs: &[String],
    at: &str,
    designspace: bool,
    svg: bool,
    settings: &PipelineSettings,
) -> Result<()> {
    let font = FontSource::load(source)?;
    let location = if designspace {
        let design = parse_design_location(at).map_err(|e| anyhow!(e))?;
        warn_unknown_axes(&font, design.iter().map(|(tag, _)| tag));
        design
    } else {
        let user: UserLocation = parse_location(at).map_err(|e| anyhow!(e))?;
        warn_unknown_axes(&font, user.iter().map(|(tag, _)| tag));
        user_location_to_designspace(&user, &font.axes)
    };
    info!("Interpolating {} glyph(s) at {}", glyphs.len(), location);

    let proxy = start_engine(settings).await?;
    proxy.store_font(font.to_json()?).await?;
    let manager = InterpolationManager::new(proxy.clone());

    let result = if let [glyph] = glyphs {
        let layer = manager.request_interpolation(glyph, &location).await;
        layer.map(|layer| {
            if svg {
                Ok(layer.svg_path())
            } else {
                serde_json::to_string_pretty(&layer)
            }
        })
    } else {
        let layers = manager.interpolate_glyphs(glyphs, &location).await;
        if layers.len() < glyphs.len() {
            warn!("{} of {} glyphs could not be interpolated", glyphs.len() - layers.len(), glyphs.len());
        }
        if svg {
            let paths: BTreeMap<&str, String> = layers
                .iter()
                .map(|(name, layer)| (name.as_str(), layer.svg_path()))
                .collect();
            Ok(serde_json::to_string_pretty(&paths))
        } else {
            Ok(serde_json::to_string_pretty(&layers))
        }
    };
    proxy.teardown();

    println!("{}", result??);
    Ok(())
}

/// Warn about location tags the font has no axis for; they are ignored.
fn warn_unknown_axes<'a>(font: &FontSource, tags: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let unknown: Vec<&str> = tags.filter(|tag| font.axis(tag).is_none()).collect();
    for tag in &unknown {
        warn!("'{}' has no axis '{}'; ignoring it", font.family_name, tag);
    }
    unknown
}

fn run_map(source: &Path, at: &str, reverse: bool) -> Result<()> {
    let font = FontSource::load(source)?;

    let design = if reverse {
        let design: DesignLocation = parse_location(at).map_err(|e| anyhow!(e))?;
        warn_unknown_axes(&font, design.iter().map(|(tag, _)| tag));
        let user = designspace_location_to_user(&design, &font.axes);
        println!("userspace:   {}", user);
        design
    } else {
        let user: UserLocation = parse_location(at).map_err(|e| anyhow!(e))?;
        warn_unknown_axes(&font, user.iter().map(|(tag, _)| tag));
        let design = user_location_to_designspace(&user, &font.axes);
        println!("designspace: {}", design);
        design
    };
    println!("normalized:  {}", normalize_location(&design, &font.axes));
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn document_id(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "font".to_string())
}

/// Poll `source` and auto-compile it to `output` after every change.
async fn run_watch(source: &Path, output: &Path, settings: &PipelineSettings) -> Result<()> {
    let font = FontSource::load(source)?;
    let documents = DocumentRegistry::new();
    let document = documents.open(FontDocument::new(document_id(source), font).with_path(PathBuf::from(source)));

    let proxy = start_engine(settings).await?;
    let (compiler, mut events) = AutoCompiler::new(
        CompilationQueue::new(proxy.clone()),
        documents,
        settings.auto_compile_delay,
    );

    // Compile the initial state once
    document.edit(|_| ());
    compiler.notify_change();
    let family = document.read(|font| font.family_name.clone());
    if let Some(path) = document.path() {
        println!("Watching {} at {} (writing {})", family, path.display(), output.display());
    }

    let mut last_modified = modified(source);
    let mut poll = tokio::time::interval(WATCH_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let current = modified(source);
                if current == last_modified {
                    continue;
                }
                last_modified = current;
                match FontSource::load(source) {
                    Ok(font) => {
                        info!("{} changed, reloading", source.display());
                        document.reload(font);
                        compiler.notify_change();
                    }
                    Err(e) => warn!("Ignoring unreadable source: {:#}", e),
                }
            }
            event = events.recv() => match event {
                Some(AutoCompileEvent::Compiled { bytes, duration, .. }) => {
                    match tokio::fs::write(output, &bytes).await {
                        Ok(()) => println!("Compiled {} in {:?}", output.display(), duration),
                        Err(e) => error!("Failed to write {}: {}", output.display(), e),
                    }
                }
                Some(AutoCompileEvent::Failed { error, .. }) => {
                    eprintln!("Compile failed: {error}");
                    if error.suggests_restart() {
                        warn!("Restarting compiler engine");
                        proxy.teardown();
                        if let Err(e) = proxy.initialize().await {
                            return Err(anyhow::Error::new(e).context("Compiler engine could not be restarted"));
                        }
                    }
                }
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_path() {
        assert_eq!(document_id(Path::new("/fonts/MyFont.json")), "MyFont");
        assert_eq!(document_id(Path::new("/fonts/MyFont.ufo")), "MyFont");
    }

    #[test]
    fn test_unknown_axis_tags_are_reported() {
        let font = crate::font_source::tests::sample_font();
        let user = UserLocation::new().with("wght", 400.0).with("wdth", 90.0);
        let unknown = warn_unknown_axes(&font, user.iter().map(|(tag, _)| tag));
        assert_eq!(unknown, vec!["wdth"]);
    }

    #[test]
    fn test_map_command_runs_on_json_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.json");
        std::fs::write(&path, crate::font_source::tests::sample_font().to_json().unwrap()).unwrap();

        run_map(&path, "wght=400", false).unwrap();
        run_map(&path, "wght=30", true).unwrap();
        assert!(run_map(&path, "wght", false).is_err());
    }
}

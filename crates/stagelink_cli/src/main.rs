//! stagelink - translate a USDA stage into a scene and report the result.
//!
//! Usage:
//!   stagelink <file.usda> [--config settings.json] [--time T]
//!             [--remove /path]... [--set /path.attr=value]... [--json]
//!
//! Edits given with `--remove` and `--set` are authored back onto the stage
//! in one change block after loading, then reconciled.

mod edit;

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use stagelink_core::{PrimPath, SchemaRegistry};
use stagelink_math::Aabb;
use stagelink_sync::{
    AssetHash, ReconcileReport, StageActor, StageEvent, SyncSettings, TranslatorRegistry,
};

use edit::SetEdit;

const USAGE: &str = "Usage: stagelink <file.usda> [--config settings.json] [--time T] \
                     [--remove /path]... [--set /path.attr=value]... [--json]";

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    stage: PathBuf,
    config: Option<PathBuf>,
    time: Option<f64>,
    removals: Vec<PrimPath>,
    edits: Vec<SetEdit>,
    json: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut stage = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{} needs a value\n{}", flag, USAGE))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--time" => {
                    let text = value("--time")?;
                    parsed.time = Some(text.parse().with_context(|| format!("invalid --time value {}", text))?);
                }
                "--remove" => parsed.removals.push(PrimPath::new(&value("--remove")?)?),
                "--set" => parsed.edits.push(SetEdit::parse(&value("--set")?)?),
                "--json" => parsed.json = true,
                "-h" | "--help" => bail!("{}", USAGE),
                flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
                _ if stage.is_none() => stage = Some(PathBuf::from(&arg)),
                _ => bail!("unexpected argument {}\n{}", arg, USAGE),
            }
        }
        parsed.stage = stage.ok_or_else(|| anyhow!(USAGE))?;
        Ok(parsed)
    }

    fn has_edits(&self) -> bool {
        !self.removals.is_empty() || !self.edits.is_empty()
    }
}

/// Engine-space box around a component's mesh assets.
#[derive(Debug, PartialEq, Serialize)]
struct Bounds {
    min: [f32; 3],
    max: [f32; 3],
}

impl Bounds {
    fn around(actor: &StageActor, assets: &[AssetHash]) -> Option<Self> {
        let bounds = assets
            .iter()
            .filter_map(|hash| actor.assets().get(*hash))
            .fold(Aabb::empty(), |acc, asset| Aabb::surrounding(&acc, &asset.mesh().bounds));
        (!bounds.is_empty()).then(|| Bounds {
            min: bounds.min().to_array(),
            max: bounds.max().to_array(),
        })
    }
}

#[derive(Serialize)]
struct TwinSummary {
    path: PrimPath,
    component: Option<&'static str>,
    assets: Vec<AssetHash>,
    bounds: Option<Bounds>,
    actor: bool,
}

#[derive(Serialize)]
struct Summary {
    stage: String,
    time: f64,
    twins: Vec<TwinSummary>,
    components: usize,
    actors: usize,
    assets: usize,
    events: Vec<StageEvent>,
    report: Option<ReconcileReport>,
}

fn summarize(actor: &StageActor, events: Vec<StageEvent>, report: Option<ReconcileReport>) -> Summary {
    let twins = actor
        .twins()
        .iter()
        .filter(|twin| !twin.path.is_root())
        .map(|twin| {
            let component = twin.component.and_then(|id| actor.world().component(id));
            let assets = component.map(|c| c.kind.assets()).unwrap_or_default();
            TwinSummary {
                path: twin.path.clone(),
                component: component.map(|c| c.kind.name()),
                bounds: Bounds::around(actor, &assets),
                assets,
                actor: twin.actor.is_some(),
            }
        })
        .collect();

    Summary {
        stage: actor.stage().identifier().to_string(),
        time: actor.time(),
        twins,
        components: actor.world().component_count(),
        actors: actor.world().actor_count(),
        assets: actor.assets().len(),
        events,
        report,
    }
}

fn print_summary(summary: &Summary) {
    println!("Stage: {} (time {})", summary.stage, summary.time);
    for twin in &summary.twins {
        let depth = twin.path.element_count();
        let mut line = format!("{}{}", "  ".repeat(depth), twin.path.name());
        if let Some(component) = twin.component {
            line.push_str(&format!(" [{}]", component));
        }
        for asset in &twin.assets {
            line.push_str(&format!(" asset={}", asset));
        }
        if let Some(bounds) = &twin.bounds {
            line.push_str(&format!(" bounds={:?}..{:?}", bounds.min, bounds.max));
        }
        if twin.actor {
            line.push_str(" (actor)");
        }
        println!("{}", line);
    }
    println!(
        "\n{} twins, {} components, {} actors, {} assets",
        summary.twins.len(),
        summary.components,
        summary.actors,
        summary.assets
    );

    if !summary.events.is_empty() {
        println!("\nEvents:");
        for event in &summary.events {
            match event {
                StageEvent::StageChanged => println!("  stage changed"),
                StageEvent::ActorLoaded(path) => println!("  actor loaded: {}", path),
                StageEvent::PrimsChanged(changes) => {
                    for (path, structural) in changes {
                        let kind = if *structural { "resync" } else { "update" };
                        println!("  {}: {}", kind, path);
                    }
                }
            }
        }
    }
    if let Some(report) = &summary.report {
        for error in &report.errors {
            println!("  error: {}", error);
        }
    }
}

fn drain(events: &Receiver<StageEvent>) -> Vec<StageEvent> {
    events.try_iter().collect()
}

fn run(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => SyncSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => SyncSettings::default(),
    };

    let registry = Arc::new(TranslatorRegistry::with_defaults(Arc::new(
        SchemaRegistry::with_builtin(),
    )));
    let mut actor = StageActor::open(&args.stage, settings, registry)
        .with_context(|| format!("failed to open {}", args.stage.display()))?;
    let events = actor.subscribe();
    actor.load()?;

    if let Some(time) = args.time {
        actor.set_time(time);
    }

    let mut report = None;
    if args.has_edits() {
        actor.stage_mut().change_block(|stage| -> Result<()> {
            for path in &args.removals {
                stage.remove_prim(path)?;
                log::info!("Removed {}", path);
            }
            for edit in &args.edits {
                edit.apply(stage)?;
            }
            Ok(())
        })?;
        report = actor.poll_changes();
    }

    let summary = summarize(&actor, drain(&events), report);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    run(args)
}

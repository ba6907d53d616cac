use std::{
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use stateset_warehouse::{
    commands::{
        AdjustQuantityCommand, Command, FinishDocumentCommand, RouteAction, RouteActionCommand,
        ScanCodeCommand,
    },
    config::{self, AppConfig},
    events,
    models::{DocumentDetails, DocumentId, DocumentType, LineId},
    services::{
        document_lifecycle::FinishOutcome,
        factory::{ServiceContainer, ServiceFactory},
        route_engine::AdvanceTicket,
        scan_engine::{ScanEngine, ScanOutcome, ScanSession},
        scheduler::{AutoAdvanceScheduler, ScheduledAdvance},
    },
    ServiceError,
};
use tokio::sync::mpsc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut app_config = config::load_config().context("failed to load configuration")?;
    if let Some(dir) = &cli.plan_dir {
        app_config.plan_dir = Some(dir.clone());
    }
    config::init_tracing(&app_config.log_level, app_config.log_json);

    let mut replay = Replay::initialize(app_config, cli.json);

    let (session, script) = match cli.command {
        Commands::Open(args) => {
            let session = replay
                .engine()
                .open(args.doc_type, &DocumentId::new(args.id.as_str()))
                .await
                .with_context(|| format!("failed to open {} document {}", args.doc_type, args.id))?;
            (session, args.script)
        }
        Commands::Start(args) => {
            let session = replay
                .engine()
                .start(DocumentDetails::default_for(args.doc_type))
                .await
                .with_context(|| format!("failed to start {} document", args.doc_type))?;
            (session, args.script)
        }
    };

    let input = read_script(script.as_deref())?;
    replay.run(session, &input).await
}

#[derive(Parser)]
#[command(
    name = "scan-replay",
    about = "Replays a scanner script against a warehouse document",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Print one JSON object per script step"
    )]
    json: bool,
    #[arg(long, global = true, help = "Directory of exported plans")]
    plan_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a plan-driven or cached document
    Open(OpenArgs),
    /// Create a new document on the floor
    Start(StartArgs),
}

#[derive(Args)]
struct OpenArgs {
    #[arg(value_parser = parse_doc_type)]
    doc_type: DocumentType,
    id: String,
    #[arg(long, help = "Script file; stdin when omitted")]
    script: Option<PathBuf>,
}

#[derive(Args)]
struct StartArgs {
    #[arg(value_parser = parse_doc_type)]
    doc_type: DocumentType,
    #[arg(long, help = "Script file; stdin when omitted")]
    script: Option<PathBuf>,
}

fn parse_doc_type(raw: &str) -> Result<DocumentType, String> {
    raw.parse::<DocumentType>()
        .map_err(|_| format!("unknown document type: {}", raw))
}

/// One line of a replay script.
#[derive(Debug, PartialEq)]
enum Step {
    Scan { code: String, confirmed: bool },
    Adjust(AdjustQuantityCommand),
    Route(RouteAction),
    Advance,
    LockZone(String),
    UnlockZone,
    Lines,
    Finish { force: bool },
}

fn parse_step(raw: &str) -> Result<Option<Step>> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let Some(directive) = line.strip_prefix('!') else {
        return Ok(Some(Step::Scan {
            code: line.to_string(),
            confirmed: false,
        }));
    };

    let mut parts = directive.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let mut arg = |what: &str| {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("!{} needs {}", name, what))
    };

    let step = match name {
        "confirm" => Step::Scan {
            code: arg("a code")?,
            confirmed: true,
        },
        "add" => {
            let line_id = LineId::new(arg("a line id")?);
            let delta = arg("a delta")?.parse().context("delta must be an integer")?;
            Step::Adjust(AdjustQuantityCommand::relative(line_id, delta))
        }
        "set" => {
            let line_id = LineId::new(arg("a line id")?);
            let value = arg("a quantity")?
                .parse()
                .context("quantity must be an integer")?;
            Step::Adjust(AdjustQuantityCommand::absolute(line_id, value))
        }
        "fill" => Step::Adjust(AdjustQuantityCommand::fill(LineId::new(arg("a line id")?))),
        "skip" => Step::Route(RouteAction::Skip),
        "not-in-cell" => Step::Route(RouteAction::NotInCell),
        "next" => Step::Route(RouteAction::Next),
        "advance" => Step::Advance,
        "lock" => Step::LockZone(arg("a zone")?),
        "unlock" => Step::UnlockZone,
        "lines" => Step::Lines,
        "finish" => Step::Finish { force: false },
        "finish-force" => Step::Finish { force: true },
        other => return Err(anyhow!("unknown directive !{}", other)),
    };
    Ok(Some(step))
}

fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read script from stdin")?;
            Ok(input)
        }
    }
}

struct Replay {
    container: ServiceContainer,
    scheduler: AutoAdvanceScheduler,
    tickets: mpsc::Receiver<AdvanceTicket>,
    pending: Option<ScheduledAdvance>,
    json: bool,
}

impl Replay {
    fn initialize(app_config: AppConfig, json: bool) -> Self {
        let (event_sender, event_rx) = events::channel(app_config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let factory = ServiceFactory::new(app_config, event_sender);
        let (scheduler, tickets) = factory.auto_advance_scheduler();
        Self {
            container: ServiceContainer::new(&factory),
            scheduler,
            tickets,
            pending: None,
            json,
        }
    }

    fn engine(&self) -> &ScanEngine {
        &self.container.engine
    }

    async fn run(&mut self, mut session: ScanSession, script: &str) -> Result<()> {
        self.print(
            "open",
            json!({
                "document": session.document(),
                "origin": session.origin(),
                "lines": session.lines(),
            }),
        )?;

        for (number, raw) in script.lines().enumerate() {
            let step = parse_step(raw).with_context(|| format!("script line {}", number + 1))?;
            let Some(step) = step else { continue };
            self.deliver_ready_tickets(&mut session).await?;

            let finished = matches!(step, Step::Finish { .. });
            match self.apply(&mut session, step).await {
                Ok(value) => self.print(raw.trim(), value)?,
                Err(err) if err.is_recoverable() => self.print(
                    raw.trim(),
                    json!({ "rejected": err.to_string(), "guidance": err.guidance() }),
                )?,
                Err(err) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("script line {} failed", number + 1)))
                }
            }
            if finished && session.document().is_completed() {
                break;
            }
        }

        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        let queued = self.container.sync_queue.len();
        self.print("summary", json!({ "document": session.document(), "queued_sync_actions": queued }))
    }

    async fn apply(
        &mut self,
        session: &mut ScanSession,
        step: Step,
    ) -> Result<serde_json::Value, ServiceError> {
        let engine = self.container.engine.clone();
        match step {
            Step::Scan { code, confirmed } => {
                let command = ScanCodeCommand { code, confirmed };
                let outcome = command.execute(&engine, session).await?;
                self.schedule_advance(&outcome);
                to_value(&outcome)
            }
            Step::Adjust(command) => {
                let outcome = command.execute(&engine, session).await?;
                self.schedule_advance(&outcome);
                to_value(&outcome)
            }
            Step::Route(action) => {
                let progress = RouteActionCommand::new(action)
                    .execute(&engine, session)
                    .await?;
                to_value(&progress)
            }
            Step::Advance => {
                let Some(pending) = self.pending.take() else {
                    return Ok(json!({ "advanced": false }));
                };
                let ticket = pending.ticket();
                match self.tickets.recv().await {
                    Some(delivered) if delivered == ticket => {
                        let progress = engine.apply_auto_advance(session, delivered).await?;
                        to_value(&json!({ "advanced": progress.is_some(), "progress": progress }))
                    }
                    _ => Ok(json!({ "advanced": false })),
                }
            }
            Step::LockZone(zone) => {
                engine.lock_zone(session, &zone)?;
                Ok(json!({ "locked_zone": zone.to_uppercase() }))
            }
            Step::UnlockZone => {
                engine.unlock_zone(session);
                Ok(json!({ "locked_zone": null }))
            }
            Step::Lines => to_value(&engine.ranked_lines(session)),
            Step::Finish { force } => {
                let command = FinishDocumentCommand {
                    force,
                    attach_snapshot: force,
                };
                let outcome = command.execute(&engine, session).await?;
                if let FinishOutcome::Completed {
                    follow_on: Some(follow_on),
                    ..
                } = &outcome
                {
                    debug!(follow_on = %follow_on.id, "follow-on document created");
                }
                to_value(&outcome)
            }
        }
    }

    fn schedule_advance(&mut self, outcome: &ScanOutcome) {
        if let ScanOutcome::LineUpdated {
            advance: Some(ticket),
            ..
        } = outcome
        {
            if let Some(previous) = self.pending.take() {
                previous.cancel();
            }
            self.pending = Some(self.scheduler.schedule(*ticket));
        }
    }

    /// Applies tickets whose delay already elapsed before the next step runs.
    async fn deliver_ready_tickets(&mut self, session: &mut ScanSession) -> Result<()> {
        while let Ok(ticket) = self.tickets.try_recv() {
            self.pending = None;
            let engine = self.container.engine.clone();
            if let Some(progress) = engine.apply_auto_advance(session, ticket).await? {
                self.print("auto-advance", to_value(&progress)?)?;
            }
        }
        Ok(())
    }

    fn print(&self, step: &str, value: serde_json::Value) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(&json!({ "step": step, "result": value }))?);
        } else {
            println!("> {}\n{}", step, serde_json::to_string_pretty(&value)?);
        }
        Ok(())
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    Ok(serde_json::to_value(value)?)
}

use anyhow::{Context, Result};
use clap::Parser;
use interview_agent::session::format_transcript;
use interview_agent::store::RecordStore;
use interview_agent::{
    Config, Outcome, SessionBackends, SessionConfig, SessionMode, SessionUpdate, VoiceSession,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Voice call with the interview agent
#[derive(Debug, Parser)]
#[command(name = "interview-agent", version)]
struct Args {
    /// Config file, extension optional
    #[arg(long, default_value = "config/interview-agent")]
    config: String,

    #[arg(long)]
    user_id: String,

    #[arg(long)]
    user_name: String,

    /// interview | generate
    #[arg(long, default_value = "interview")]
    mode: SessionMode,

    /// Stored interview to run (fills in questions, role, level, tech stack)
    #[arg(long)]
    interview_id: Option<String>,

    #[arg(long)]
    role: Option<String>,

    #[arg(long)]
    level: Option<String>,

    #[arg(long)]
    tech_stack: Option<String>,

    #[arg(long)]
    focus: Option<String>,

    /// Prepared question, repeatable
    #[arg(long = "question")]
    questions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Interview Agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Agent transport: {:?} at {}", cfg.agent.transport, cfg.agent.url);

    let config = session_config(&cfg, &args).await?;

    let backends = SessionBackends {
        transport: cfg.transport(),
        microphone: cfg.microphone()?,
        speech: cfg.speech_engine(),
        evaluator: cfg.evaluator(),
    };
    let mut session = VoiceSession::new(config, backends, cfg.session_options());

    let control = session.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, ending call");
            control.end();
        }
    });

    session.start().await?;
    println!("Call started. Press Ctrl-C to end.");

    while let Some(update) = session.next_update().await {
        match update {
            SessionUpdate::StateChanged(state) => info!("Call is {}", state),
            SessionUpdate::AgentSpeaking(speaking) => {
                if speaking {
                    println!("(agent speaking)");
                }
            }
            SessionUpdate::TranscriptAppended(entry) => {
                println!("{}: {}", entry.role, entry.content)
            }
            SessionUpdate::Caption(update) => println!("  ... {}", update.content),
            SessionUpdate::Notice(error) => warn!("{}", error),
            SessionUpdate::Finished(outcome) => print_outcome(&outcome),
        }
    }

    let stats = session.stats();
    info!(
        "Call lasted {:.1}s, {} chunks sent",
        stats.duration_secs, stats.chunks_sent
    );

    println!("\nTranscript:\n{}", format_transcript(session.transcript()));
    Ok(())
}

async fn session_config(cfg: &Config, args: &Args) -> Result<SessionConfig> {
    let mut config = match (&args.interview_id, args.mode) {
        (Some(id), SessionMode::Interview) => {
            let record = cfg
                .store()
                .get_interview(id)
                .await?
                .with_context(|| format!("Interview {} not found", id))?;
            record.session_config(id, &args.user_id, &args.user_name)
        }
        _ => {
            let mut config = SessionConfig::new(&args.user_id, &args.user_name, args.mode);
            config.interview_id = args.interview_id.clone();
            config
        }
    };

    if !args.questions.is_empty() {
        config.questions = args.questions.clone();
    }
    config.role = args.role.clone().or(config.role);
    config.level = args.level.clone().or(config.level);
    config.tech_stack = args.tech_stack.clone().or(config.tech_stack);
    config.focus = args.focus.clone().or(config.focus);

    Ok(config)
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::ResultsReady { interview_id } => match interview_id {
            Some(id) => println!("Interview {} is ready", id),
            None => println!("Interview generated"),
        },
        Outcome::FeedbackReady {
            interview_id,
            feedback_id,
        } => println!(
            "Feedback ready for interview {} ({})",
            interview_id,
            feedback_id.as_deref().unwrap_or("no id")
        ),
        Outcome::Fallback { error } => println!("No feedback: {}", error),
    }
}

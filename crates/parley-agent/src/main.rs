//! Parley application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Run the requested command: train (optionally online), run or restore

mod cli;

use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use parley_agent::{
    load_tracker_from_json, persist_model, replay_events, train_ensemble, Agent,
};
use parley_channel::{ConsoleInputChannel, ConsoleOutputChannel};
use parley_core::config::ParleyConfig;
use parley_core::{DialogueStateTracker, Domain};
use parley_nlu::create_interpreter;
use parley_policy::{
    ConsoleTrainingPort, Decision, OnlinePolicyEnsemble, PolicyError, Predictor,
};

use cli::{CliArgs, Command};

/// Lets the binary get the online ensemble back once the agent is done with it.
struct SharedOnlineEnsemble(Arc<Mutex<OnlinePolicyEnsemble>>);

impl Predictor for SharedOnlineEnsemble {
    fn predict_next(
        &mut self,
        tracker: &mut DialogueStateTracker,
        domain: &Domain,
    ) -> Result<Decision, PolicyError> {
        self.0
            .lock()
            .expect("online ensemble mutex poisoned")
            .predict_next(tracker, domain)
    }
}

async fn train(
    config: &ParleyConfig,
    model_dir: &Path,
    domain_path: &Path,
    stories_path: &Path,
    online: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let domain = Domain::load(domain_path)?;
    let (ensemble, data) = train_ensemble(&domain, stories_path, &config.policy)?;
    tracing::info!(
        examples = data.num_examples(),
        policies = ?ensemble.policy_names(),
        "Dialogue model trained"
    );
    persist_model(model_dir, &domain, &ensemble)?;

    if !online {
        return Ok(());
    }

    let domain = Arc::new(domain);
    let shared = Arc::new(Mutex::new(OnlinePolicyEnsemble::new(
        ensemble,
        data,
        &config.online,
        Box::new(ConsoleTrainingPort),
    )));
    let agent = Agent::new(
        Arc::clone(&domain),
        Box::new(SharedOnlineEnsemble(Arc::clone(&shared))),
        create_interpreter(&config.interpreter)?,
    )
    .with_config(config.agent.clone());

    println!("Bot loaded. Type a message and press enter (use '/stop' to exit).");
    let mut input = ConsoleInputChannel::stdin("default");
    agent
        .handle_channel(&mut input, &ConsoleOutputChannel::stdout())
        .await?;
    drop(agent);

    // Keep what was learned during the session.
    let online = shared.lock().expect("online ensemble mutex poisoned");
    tracing::info!(
        corrected_stories = online.stories().len(),
        intent_examples = online.extra_intent_examples().len(),
        "Online training finished"
    );
    persist_model(model_dir, &domain, online.base())?;
    Ok(())
}

async fn run(
    config: &ParleyConfig,
    model_dir: &Path,
    sender_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = Agent::load(model_dir, config)?;
    println!("Bot loaded. Type a message and press enter (use '/stop' to exit).");
    let mut input = ConsoleInputChannel::stdin(sender_id);
    agent
        .handle_channel(&mut input, &ConsoleOutputChannel::stdout())
        .await?;
    Ok(())
}

async fn restore(
    config: &ParleyConfig,
    model_dir: &Path,
    tracker_dump: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = Agent::load(model_dir, config)?;
    let tracker = load_tracker_from_json(tracker_dump, agent.domain())?;
    let output = ConsoleOutputChannel::stdout();

    let report = replay_events(&tracker, &agent, &output).await?;
    tracing::info!(
        utterances = report.utterances,
        divergences = report.divergences.len(),
        "Conversation restored"
    );

    println!("You can now continue the dialogue. Use '/stop' to exit the conversation.");
    let mut input = ConsoleInputChannel::stdin(tracker.sender_id());
    agent.handle_channel(&mut input, &output).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config = ParleyConfig::load_or_default(&config_file);
    let log_level = args.resolve_log_level(&config.general.log_level);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    let model_dir = args.resolve_model_dir(&config.general.model_dir);

    match &args.command {
        Command::Train {
            domain,
            stories,
            online,
        } => train(&config, &model_dir, domain, stories, *online).await,
        Command::Run { sender_id } => run(&config, &model_dir, sender_id).await,
        Command::Restore { tracker_dump } => restore(&config, &model_dir, tracker_dump).await,
    }
}

// passcode-lock CLI - drive the passcode lock from a terminal
// Signs are read without echo and fed to the lock one at a time

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use parking_lot::Mutex;
use passcode_lock::biometrics::SystemBiometricAuthenticator;
use passcode_lock::{
    BiometricOutcome, FailureReason, FileRepository, LockMode, PasscodeLock,
    PasscodeLockConfiguration, PasscodeLockController, PasscodeLockDelegate, PasscodeLockState,
    PasscodeRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const BIOMETRIC_TIMEOUT: Duration = Duration::from_secs(120);
const BIOMETRIC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Numeric passcode lock with throttling and biometric unlock
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: standard config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Encrypted passcode store (default: standard config directory)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Try biometric unlock before asking for the passcode
    #[arg(long, global = true)]
    touch_id: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Choose a new passcode
    Set,
    /// Unlock with the current passcode
    Enter,
    /// Verify the current passcode, then choose a new one
    Change,
    /// Verify the current passcode, then delete it
    Remove,
    /// Show whether a passcode is set and the active settings
    Status,
}

/// Last outcome reported by the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure(FailureReason),
    StateChanged,
}

#[derive(Default)]
struct TerminalDelegate {
    outcome: Mutex<Option<Outcome>>,
}

impl TerminalDelegate {
    fn take(&self) -> Option<Outcome> {
        self.outcome.lock().take()
    }
}

impl PasscodeLockDelegate for TerminalDelegate {
    fn on_success(&self) {
        *self.outcome.lock() = Some(Outcome::Success);
    }

    fn on_failure(&self, reason: FailureReason) {
        *self.outcome.lock() = Some(Outcome::Failure(reason));
    }

    fn on_state_changed(&self) {
        *self.outcome.lock() = Some(Outcome::StateChanged);
    }

    fn on_sign_added(&self, _index: usize) {}

    fn on_sign_removed(&self, _index: usize) {}
}

fn load_configuration(path: Option<&PathBuf>) -> Result<PasscodeLockConfiguration> {
    let mut configuration = match path {
        Some(path) => PasscodeLockConfiguration::load_from_path(path)?,
        None => PasscodeLockConfiguration::load()?,
    };
    configuration.apply_env_overrides();
    configuration.validate()?;
    Ok(configuration)
}

fn open_repository(path: Option<&PathBuf>) -> Result<Arc<FileRepository>> {
    let repository = match path {
        Some(path) => FileRepository::open(path)?,
        None => FileRepository::open_default()?,
    };
    Ok(Arc::new(repository))
}

fn print_status(configuration: &PasscodeLockConfiguration, repository: &FileRepository) {
    println!("Passcode store: {}", repository.path().display());
    println!(
        "Passcode set:   {}",
        if repository.has_passcode() { "yes" } else { "no" }
    );
    println!("Length:         {}", configuration.passcode_length);
    if configuration.throttling_enabled {
        println!(
            "Throttling:     {} attempts, {} second lockout",
            configuration.maximum_incorrect_attempts, configuration.lockout_seconds
        );
    } else {
        println!("Throttling:     disabled");
    }
    println!(
        "Touch ID:       {}",
        if configuration.touch_id_allowed { "allowed" } else { "off" }
    );
}

/// Wait for the outstanding biometric request to resolve
fn wait_for_biometrics(controller: &mut PasscodeLockController) -> Option<BiometricOutcome> {
    let started = Instant::now();
    while started.elapsed() < BIOMETRIC_TIMEOUT {
        if let Some(outcome) = controller.lock_mut().process_biometric_reply() {
            return Some(outcome);
        }
        thread::sleep(BIOMETRIC_POLL_INTERVAL);
    }
    None
}

fn run_flow(
    mode: LockMode,
    configuration: PasscodeLockConfiguration,
    repository: Arc<FileRepository>,
    touch_id: bool,
) -> Result<bool> {
    let delegate = Arc::new(TerminalDelegate::default());
    let mut lock = PasscodeLock::new(
        PasscodeLockState::for_mode(mode),
        configuration,
        repository.clone(),
    );
    if touch_id {
        lock = lock.with_biometric_authenticator(Arc::new(SystemBiometricAuthenticator::new()));
    }
    lock.set_delegate(&delegate);
    let mut controller = PasscodeLockController::from_lock(lock);

    if print_lockout(controller.lock()) {
        return Ok(false);
    }

    if touch_id && controller.authenticate_with_biometrics() {
        println!("Waiting for biometric authentication...");
        match wait_for_biometrics(&mut controller) {
            Some(BiometricOutcome::Success) => {
                if delegate.take() == Some(Outcome::Success) {
                    return finish(mode, &repository);
                }
            }
            Some(other) => println!("Biometric unlock did not succeed ({:?})", other),
            None => println!("Biometric unlock timed out"),
        }
    }

    loop {
        let view = controller.view_model();
        println!("\n{}\n{}", view.title, view.description);

        let input = rpassword::prompt_password(format!(
            "Passcode ({} digits, empty to cancel): ",
            view.passcode_length
        ))
        .context("Failed to read passcode")?;
        let input = input.trim();

        if input.is_empty() {
            println!("Cancelled");
            return Ok(false);
        }
        if input.chars().count() != view.passcode_length
            || !input.chars().all(|c| c.is_ascii_digit())
        {
            println!("Enter exactly {} digits", view.passcode_length);
            continue;
        }

        for sign in input.chars() {
            controller.lock_mut().add_sign(sign);
        }

        match delegate.take() {
            Some(Outcome::Success) => return finish(mode, &repository),
            Some(Outcome::StateChanged) | None => continue,
            Some(Outcome::Failure(FailureReason::IncorrectPasscode)) => {
                let throttle = controller.lock().throttle();
                match throttle.attempts_remaining() {
                    Some(left) => println!("Incorrect passcode ({} attempts left)", left),
                    None => println!("Incorrect passcode"),
                }
            }
            Some(Outcome::Failure(FailureReason::Throttled)) => {
                print_lockout(controller.lock());
                return Ok(false);
            }
            Some(Outcome::Failure(FailureReason::RepositoryHasNoPasscode)) => {
                println!("No passcode has been set. Run 'passcode-lock set' first.");
                return Ok(false);
            }
        }
    }
}

/// Print the throttle message if the lock is locked out
fn print_lockout(lock: &PasscodeLock) -> bool {
    let throttle = lock.throttle();
    if !throttle.is_throttled() {
        return false;
    }
    let message = lock.throttle_message();
    println!("{}\n{}", message.title, message.body);
    match throttle.remaining_lockout() {
        Some(remaining) if remaining < Duration::MAX => {
            println!("Try again in {} seconds", remaining.as_secs() + 1)
        }
        _ => println!("Locked until the passcode is verified another way"),
    }
    true
}

fn finish(mode: LockMode, repository: &FileRepository) -> Result<bool> {
    match mode {
        LockMode::Enter => println!("Unlocked"),
        LockMode::Set | LockMode::Change => println!("Passcode saved"),
        LockMode::Remove => {
            repository
                .delete_passcode()
                .context("Failed to delete passcode")?;
            println!("Passcode removed");
        }
    }
    Ok(true)
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let result = (|| -> Result<bool> {
        let configuration =
            load_configuration(args.config.as_ref()).context("Failed to load configuration")?;
        let repository =
            open_repository(args.store.as_ref()).context("Failed to open passcode store")?;

        let mode = match args.command {
            Command::Status => {
                print_status(&configuration, &repository);
                return Ok(true);
            }
            Command::Set => LockMode::Set,
            Command::Enter => LockMode::Enter,
            Command::Change => LockMode::Change,
            Command::Remove => LockMode::Remove,
        };

        if let Err(e) = PasscodeLockController::check_can_start(mode, &*repository) {
            println!("{}", e);
            match mode {
                LockMode::Set => println!("Run 'passcode-lock change' to replace it."),
                _ => println!("Run 'passcode-lock set' first."),
            }
            return Ok(false);
        }

        info!("Starting {:?} flow", mode);
        run_flow(mode, configuration, repository, args.touch_id)
    })();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

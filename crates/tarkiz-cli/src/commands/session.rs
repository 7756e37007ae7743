use chrono::Utc;
use clap::Subcommand;
use tarkiz_core::credentials::{set_passcode, KeyringStore};
use tarkiz_core::session::{PasscodeVerifier, SessionStatus, UnlockGate};
use tarkiz_core::storage::Database;
use tarkiz_core::Config;
use tokio_util::sync::CancellationToken;

use super::{governing_schedule, load_machine, CmdResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show the session state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lock or unlock according to the current time
    Check,
    /// Unlock with the passcode
    Unlock {
        #[arg(long)]
        passcode: String,
    },
    /// Spend one emergency unlock
    Emergency,
    /// Return to a fresh unlocked state
    Reset,
    /// Set the unlock passcode (at least 4 digits)
    SetPasscode { passcode: String },
}

pub fn run(action: SessionAction) -> CmdResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let now = Utc::now();
    let mut machine = load_machine(&db, &config, now)?;

    match action {
        SessionAction::Status { json } => {
            if json {
                let out = serde_json::json!({
                    "state": machine.state(),
                    "mode": machine.mode().id,
                    "strict_mode": machine.strict_mode(),
                    "emergency_unlocks_left": machine.quota().available(now),
                    "emergency_unlocks_reset_at": machine.quota().resets_at(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            let state = machine.state();
            match (state.status, state.active_window) {
                (SessionStatus::Locked, Some(window)) => {
                    let left = (window.end - now).num_minutes().max(0);
                    println!("locked for {} ({} min left)", window.prayer, left);
                }
                _ => println!("unlocked"),
            }
            println!("mode: {}", machine.mode().name);
            println!("emergency unlocks: {}", machine.quota().describe(now));
            if machine.strict_mode() {
                println!("strict mode: on");
            }
        }
        SessionAction::Check => {
            let schedule = governing_schedule(&config, &machine, now)?;
            let event = db.apply_transition(&mut machine, |m, sink| {
                m.evaluate(now, &schedule, sink)
            })?;
            match event {
                Some(event) => println!("{}", event.kind()),
                None => println!("no change"),
            }
        }
        SessionAction::Unlock { passcode } => {
            let store = KeyringStore::default();
            let verifier = PasscodeVerifier::new(&store, passcode);
            let gate = UnlockGate::new();
            let cancel = CancellationToken::new();
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let verified = rt.block_on(gate.attempt(&verifier, &cancel))?;
            match db.apply_transition(&mut machine, |m, sink| m.unlock(&verified, now, sink))? {
                Some(_) => println!("unlocked"),
                None => println!("not locked"),
            }
        }
        SessionAction::Emergency => {
            match db.apply_transition(&mut machine, |m, sink| m.emergency_unlock(now, sink))? {
                Some(_) => println!("unlocked ({})", machine.quota().describe(now)),
                None => println!("not locked"),
            }
        }
        SessionAction::Reset => {
            db.apply_transition(&mut machine, |m, sink| m.reset(now, sink))?;
            println!("session reset");
        }
        SessionAction::SetPasscode { passcode } => {
            set_passcode(&KeyringStore::default(), &passcode)?;
            println!("passcode saved");
        }
    }
    Ok(())
}

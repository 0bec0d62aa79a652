use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arboard::Clipboard;
use tracing::debug;

pub trait Delivery {
    fn name(&self) -> &str;

    fn attempt(&self, text: &str) -> Result<()>;
}

pub struct ClipboardChain {
    mechanisms: Vec<Box<dyn Delivery>>,
}

impl ClipboardChain {
    pub fn new(mechanisms: Vec<Box<dyn Delivery>>) -> Self {
        Self { mechanisms }
    }

    pub fn system(clear_after: Option<Duration>) -> Self {
        Self::new(vec![
            Box::new(ArboardDelivery::new(clear_after)),
            Box::new(CommandDelivery::new("xclip", &["-selection", "clipboard"])),
            Box::new(CommandDelivery::new("xsel", &["--clipboard", "--input"])),
            Box::new(CommandDelivery::new("wl-copy", &[])),
            Box::new(CommandDelivery::new("termux-clipboard-set", &[])),
        ])
    }

    pub fn deliver(&self, secret: &str) -> bool {
        for mechanism in &self.mechanisms {
            match mechanism.attempt(secret) {
                Ok(()) => {
                    debug!(mechanism = mechanism.name(), "clipboard delivery succeeded");
                    return true;
                }
                Err(e) => debug!(mechanism = mechanism.name(), "clipboard delivery failed: {e:#}"),
            }
        }
        false
    }
}

/// Cross-platform clipboard. The handle lives as long as the delivery so the
/// contents survive on X11; with `clear_after` set, only the most recent copy
/// gets wiped once that long has passed.
pub struct ArboardDelivery {
    clear_after: Option<Duration>,
    held: Arc<Mutex<Option<Clipboard>>>,
    generation: CopyGeneration,
}

impl ArboardDelivery {
    pub fn new(clear_after: Option<Duration>) -> Self {
        Self {
            clear_after,
            held: Arc::new(Mutex::new(None)),
            generation: CopyGeneration::default(),
        }
    }
}

impl Delivery for ArboardDelivery {
    fn name(&self) -> &str {
        "arboard"
    }

    fn attempt(&self, text: &str) -> Result<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| anyhow!("Clipboard handle poisoned"))?;
        if held.is_none() {
            *held = Some(Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {e}"))?);
        }
        let Some(clipboard) = held.as_mut() else {
            return Err(anyhow!("Clipboard unavailable"));
        };
        if let Err(e) = clipboard.set_text(text.to_owned()) {
            *held = None;
            return Err(anyhow!("Failed to set clipboard: {e}"));
        }
        drop(held);

        let id = self.generation.next();
        if let Some(lifetime) = self.clear_after {
            let held = Arc::clone(&self.held);
            clear_later(self.generation.clone(), id, lifetime, move || {
                if let Ok(mut held) = held.lock() {
                    if let Some(clipboard) = held.as_mut() {
                        let _ = clipboard.set_text(String::new());
                    }
                }
            });
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CopyGeneration(Arc<AtomicU64>);

impl CopyGeneration {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, id: u64) -> bool {
        self.0.load(Ordering::SeqCst) == id
    }
}

// A later copy supersedes this one; its own timer does the clearing.
fn clear_later<F>(generation: CopyGeneration, id: u64, lifetime: Duration, clear: F) -> JoinHandle<bool>
where
    F: FnOnce() + Send + 'static,
{
    thread::spawn(move || {
        thread::sleep(lifetime);
        if !generation.is_current(id) {
            return false;
        }
        clear();
        true
    })
}

pub struct CommandDelivery {
    program: String,
    args: Vec<String>,
}

impl CommandDelivery {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Delivery for CommandDelivery {
    fn name(&self) -> &str {
        &self.program
    }

    fn attempt(&self, text: &str) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("{} not available", self.program))?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("{} stdin unavailable", self.program))?;
            stdin.write_all(text.as_bytes())?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(anyhow!("{} exited with {status}", self.program));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Delivery for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn attempt(&self, _text: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(anyhow!("unavailable"))
            }
        }
    }

    fn chain(outcomes: &[bool]) -> (ClipboardChain, Vec<Arc<AtomicUsize>>) {
        let counters: Vec<Arc<AtomicUsize>> =
            outcomes.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let mechanisms = outcomes
            .iter()
            .zip(&counters)
            .map(|(&succeed, calls)| {
                Box::new(Counting {
                    succeed,
                    calls: Arc::clone(calls),
                }) as Box<dyn Delivery>
            })
            .collect();
        (ClipboardChain::new(mechanisms), counters)
    }

    fn counts(counters: &[Arc<AtomicUsize>]) -> Vec<usize> {
        counters.iter().map(|c| c.load(Ordering::SeqCst)).collect()
    }

    #[test]
    fn stops_at_first_success() {
        let (chain, counters) = chain(&[true, true, true]);
        assert!(chain.deliver("secret"));
        assert_eq!(counts(&counters), [1, 0, 0]);
    }

    #[test]
    fn falls_through_failures_in_order() {
        let (chain, counters) = chain(&[false, false, true, true]);
        assert!(chain.deliver("secret"));
        assert_eq!(counts(&counters), [1, 1, 1, 0]);
    }

    #[test]
    fn exhausted_chain_reports_failure() {
        let (chain, counters) = chain(&[false, false]);
        assert!(!chain.deliver("secret"));
        assert_eq!(counts(&counters), [1, 1]);
        assert!(!ClipboardChain::new(Vec::new()).deliver("secret"));
    }

    #[test]
    fn only_latest_copy_is_cleared() {
        let generation = CopyGeneration::default();
        let clears = Arc::new(AtomicUsize::new(0));
        let lifetime = Duration::from_millis(100);

        let first_id = generation.next();
        let first_clears = Arc::clone(&clears);
        let first = clear_later(generation.clone(), first_id, lifetime, move || {
            first_clears.fetch_add(1, Ordering::SeqCst);
        });
        let second_id = generation.next();
        let second_clears = Arc::clone(&clears);
        let second = clear_later(generation.clone(), second_id, lifetime, move || {
            second_clears.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!first.join().unwrap());
        assert!(second.join().unwrap());
        assert_eq!(clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lone_copy_is_cleared_after_lifetime() {
        let generation = CopyGeneration::default();
        let id = generation.next();
        let cleared = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&cleared);
        let handle = clear_later(generation, id, Duration::from_millis(10), move || {
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handle.join().unwrap());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_utility_is_an_error() {
        let delivery = CommandDelivery::new("definitely-not-a-clipboard-tool", &[]);
        assert!(delivery.attempt("secret").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn utility_exit_status_decides_success() {
        assert!(CommandDelivery::new("sh", &["-c", "cat >/dev/null"]).attempt("x").is_ok());
        assert!(CommandDelivery::new("sh", &["-c", "cat >/dev/null; exit 1"]).attempt("x").is_err());
    }
}

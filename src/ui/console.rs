use std::io::BufRead;

use tokio::sync::mpsc;

/// Operator-facing command console.
pub trait Console {
    /// `system` lines come from the agent; the rest echo the operator.
    fn write_line(&mut self, text: &str, system: bool);
    fn clear(&mut self);
}

/// Console on the process's stdout.
#[derive(Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write_line(&mut self, text: &str, system: bool) {
        let ts = chrono::Local::now().format("%H:%M:%S");
        if system {
            println!("{ts} [system] {text}");
        } else {
            println!("{ts} > {text}");
        }
        tracing::debug!(target: "console", system, "{text}");
    }

    fn clear(&mut self) {
        print!("\x1B[2J\x1B[1;1H");
    }
}

/// Spawn the stdin reader. Each non-empty trimmed line becomes a command;
/// the channel closes at EOF.
pub fn spawn_command_reader() -> mpsc::Receiver<String> {
    spawn_reader(std::io::BufReader::new(std::io::stdin()))
}

/// Reads on a plain OS thread: a read parked on the console must never hold
/// up runtime shutdown.
fn spawn_reader<R>(input: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    let cmd = line.trim();
                    if cmd.is_empty() {
                        continue;
                    }
                    if tx.blocking_send(cmd.to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        tracing::debug!("command reader exited");
    });
    rx
}

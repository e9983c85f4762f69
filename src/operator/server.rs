use crate::allocator::SlotAllocator;
use crate::control::{self, STOP_TOKEN, StopSignal};
use crate::error::{SlotError, SlotResult};
use crate::operator::pure::parse_instruction;
use crate::operator::types::{OperatorCommand, ScriptAction};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct OperatorServer {
    allocator: Arc<SlotAllocator>,
}

impl OperatorServer {
    pub fn new(allocator: Arc<SlotAllocator>) -> Self {
        Self { allocator }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.allocator.config().probe_timeout_ms)
    }

    /// Parse and run one instruction, returning the reply line.
    pub fn handle_line(&self, line: &str) -> String {
        match parse_instruction(line) {
            Ok(command) => match self.execute(&command) {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("operator - '{}' failed: {}", line.trim(), e);
                    format!("error: {}", e)
                }
            },
            Err(e) => format!("error: {}", e),
        }
    }

    pub fn execute(&self, command: &OperatorCommand) -> SlotResult<String> {
        tracing::info!("operator - Executing {:?}", command);
        match command {
            OperatorCommand::Script { name, action } => self.script_action(name, *action),
            OperatorCommand::FreeAllSlots => {
                let freed = self.allocator.free_all(false)?;
                Ok(format!("freed {} slot(s)", freed))
            }
            OperatorCommand::FreeDeniedSlots => {
                let freed = self.allocator.free_all(true)?;
                Ok(format!("freed {} denied slot(s)", freed))
            }
            OperatorCommand::List => {
                let names = self.allocator.list_owner_names()?;
                if names.is_empty() {
                    Ok("no occupied slots".to_string())
                } else {
                    Ok(names.join(", "))
                }
            }
            OperatorCommand::Refit => {
                let placed = self.allocator.refit_all()?;
                Ok(format!("refit {} window(s)", placed))
            }
            OperatorCommand::RefitServer => {
                self.allocator.refit_server()?;
                Ok("server window refit".to_string())
            }
        }
    }

    fn script_action(&self, name: &str, action: ScriptAction) -> SlotResult<String> {
        let entry = self
            .allocator
            .registry()
            .get(name)
            .ok_or_else(|| SlotError::UnknownScript(name.to_string()))?;

        match action {
            ScriptAction::Start => {
                let Some((program, args)) = entry.command.split_first() else {
                    return Err(SlotError::Backend(format!("no command configured for {}", name)));
                };
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .spawn()?;
                let pid = child.id();
                // Reap it so finished scripts do not linger as zombies
                let owner = name.to_string();
                std::thread::spawn(move || match child.wait() {
                    Ok(status) => tracing::info!("operator - {} exited with {}", owner, status),
                    Err(e) => tracing::warn!("operator - Lost track of {}: {}", owner, e),
                });
                tracing::info!("operator - Started {} (pid {})", name, pid);
                Ok(format!("started {} (pid {})", name, pid))
            }
            ScriptAction::Stop => {
                match control::send_message(("127.0.0.1", entry.port), STOP_TOKEN, self.probe_timeout()) {
                    Ok(_) => Ok(format!("stop sent to {}", name)),
                    Err(e) => {
                        tracing::info!("operator - {} did not take the stop: {}", name, e);
                        Ok(format!("{} is not running", name))
                    }
                }
            }
            ScriptAction::Unlock => match self.allocator.force_unlock(name) {
                Ok(true) => Ok(format!("removed lock of {}", name)),
                Ok(false) => Ok(format!("no lock for {}", name)),
                Err(SlotError::LockHeld { .. }) => Ok(format!("{} seems to be running, cannot unlock", name)),
                Err(e) => Err(e),
            },
        }
    }

    /// Serve until `stop` triggers. Each client gets its own thread.
    pub fn serve<A: ToSocketAddrs>(&self, addr: A, stop: &StopSignal) -> SlotResult<()> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!("operator - Listening on {}", listener.local_addr()?);

        while !stop.is_stopped() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    let spawned = std::thread::Builder::new()
                        .name("operator-client".to_string())
                        .spawn(move || {
                            if let Err(e) = server.serve_client(stream) {
                                tracing::debug!("operator - Client {} dropped: {}", peer, e);
                            }
                        });
                    if let Err(e) = spawned {
                        tracing::error!("operator - Cannot spawn client thread: {}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    stop.sleep(ACCEPT_POLL);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!("operator - Stopped");
        Ok(())
    }

    fn serve_client(&self, stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;
        let mut writer = stream.try_clone()?;
        for line in BufReader::new(stream).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.handle_line(&line);
            writeln!(writer, "{}", reply)?;
            writer.flush()?;
        }
        Ok(())
    }
}

//! GnuPG adapter
//!
//! Shells out to `gpg --batch`. Symmetric mode feeds the passphrase as the
//! first line of stdin (`--passphrase-fd 0`) followed by the data.

use std::io::Write;
use std::process::{Command, Stdio};

use super::{AdapterError, EncryptionAdapter, RecipientConfig};

/// Adapter that invokes an external `gpg` program
#[derive(Debug, Clone)]
pub struct GpgAdapter {
    program: String,
}

impl GpgAdapter {
    pub const NAME: &'static str = "gpg";

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments and stdin prefix for one transform.
    fn invocation(
        &self,
        decrypt: bool,
        recipient: &RecipientConfig,
    ) -> Result<(Vec<String>, Vec<u8>), AdapterError> {
        let mut args: Vec<String> = ["--batch", "--yes", "--quiet", "--no-tty", "--output", "-"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut stdin_prefix = Vec::new();

        match recipient {
            RecipientConfig::Passphrase(pass) => {
                if pass.is_empty() {
                    return Err(AdapterError::MissingPassphrase {
                        adapter: Self::NAME.into(),
                    });
                }
                args.extend(
                    ["--pinentry-mode", "loopback", "--passphrase-fd", "0"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                args.push(if decrypt { "--decrypt" } else { "--symmetric" }.to_string());
                stdin_prefix.extend_from_slice(pass.expose().as_bytes());
                stdin_prefix.push(b'\n');
            }
            RecipientConfig::Recipients(ids) => {
                if decrypt {
                    args.push("--decrypt".into());
                } else {
                    if ids.is_empty() {
                        return Err(AdapterError::Unsupported {
                            adapter: Self::NAME.into(),
                            what: "encryption without recipients".into(),
                        });
                    }
                    args.push("--encrypt".into());
                    for id in ids {
                        args.push("--recipient".into());
                        args.push(id.clone());
                    }
                }
            }
        }

        Ok((args, stdin_prefix))
    }

    fn run(&self, args: &[String], stdin_prefix: Vec<u8>, data: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AdapterError::Unavailable {
                adapter: Self::NAME.into(),
                reason: format!("failed to start {}: {}", self.program, e),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdapterError::Io(std::io::Error::other("stdin not captured")))?;
        let mut input = stdin_prefix;
        input.extend_from_slice(data);

        // Feed stdin from a helper thread so a full stdout pipe cannot deadlock us.
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            let result = stdin.write_all(&input);
            zeroize::Zeroize::zeroize(&mut input);
            result
        });

        let output = child.wait_with_output()?;
        let write_result = writer
            .join()
            .map_err(|_| AdapterError::Io(std::io::Error::other("stdin writer panicked")))?;

        if !output.status.success() {
            return Err(AdapterError::CommandFailed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        write_result?;
        Ok(output.stdout)
    }
}

impl EncryptionAdapter for GpgAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check_available(&self) -> Result<(), AdapterError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| AdapterError::Unavailable {
                adapter: Self::NAME.into(),
                reason: format!("{}: {}", self.program, e),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(AdapterError::Unavailable {
                adapter: Self::NAME.into(),
                reason: format!("{} --version exited with {}", self.program, output.status),
            })
        }
    }

    fn encrypt(&self, plaintext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        let (args, prefix) = self.invocation(false, recipient)?;
        self.run(&args, prefix, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], recipient: &RecipientConfig) -> Result<Vec<u8>, AdapterError> {
        let (args, prefix) = self.invocation(true, recipient)?;
        self.run(&args, prefix, ciphertext)
    }
}

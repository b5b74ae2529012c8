//! One-shot auxiliary invocations of the agent binary
//!
//! Runs `authtoken <token>` to register a credential in the agent's config
//! file. Independent of the supervisor: it may run with or without an
//! active supervised process, and the spawned process never outlives the
//! call.

use crate::error::{Error, Result};
use crate::options::Options;
use crate::process::AgentProcess;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Register the authtoken credential with the agent.
///
/// Accepts a bare token (`set_authtoken("tok")`) or full [`Options`] with
/// the `authtoken` field set. Resolves on the first chunk of stdout, which
/// is taken as acknowledgment without parsing its content; any stderr
/// output fails with [`Error::AuthToken`]. The process is terminated before
/// returning on every path.
pub async fn set_authtoken(options: impl Into<Options>) -> Result<()> {
    let options = options.into();
    let token = options.authtoken.as_deref().ok_or(Error::AuthToken)?;

    let dir = options.working_dir();
    let args = options.authtoken_args(token);
    info!("Registering authtoken in {:?}", dir);

    let (mut agent, mut stdout, mut stderr) = AgentProcess::spawn(&dir, &args)?;

    let mut out_buf = vec![0u8; 4096];
    let mut err_buf = vec![0u8; 4096];
    let mut stdout_open = true;
    let mut stderr_open = true;

    // First stdout chunk wins; stderr output is fatal. A closed stream only
    // stops being polled, it is not a signal by itself.
    let outcome = loop {
        tokio::select! {
            read = stdout.read(&mut out_buf), if stdout_open => match read {
                Ok(n) if n > 0 => break Ok(()),
                _ => stdout_open = false,
            },
            read = stderr.read(&mut err_buf), if stderr_open => match read {
                Ok(n) if n > 0 => {
                    let text = String::from_utf8_lossy(&err_buf[..n]);
                    debug!("authtoken stderr: {}", text.trim_end());
                    break Err(Error::AuthToken);
                }
                _ => stderr_open = false,
            },
            else => break Err(Error::AuthToken),
        }
    };

    // Terminate before handing control back, regardless of outcome
    if let Err(e) = agent.kill().await {
        debug!("Kill after authtoken run: {}", e);
    }

    if outcome.is_ok() {
        info!("Authtoken registered");
    }
    outcome
}

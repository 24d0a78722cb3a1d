use anyhow::Result;
use std::{
    borrow::Cow,
    future::Future,
    io::{self, Write},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::api::ApiClient;

const BANNER: &str = "Welcome! Press Ctrl + C to exit.";
const PROMPT: &str = "You: ";
const REPLY: &str = "Reply: ";
const FAREWELL: &str = "Received exit signal, shutting down...";

/// Runs the chat loop on stdin/stdout until a shutdown signal arrives or stdin closes.
pub async fn run(client: ApiClient) -> Result<()> {
    println!("{BANNER}");
    run_with(
        client,
        BufReader::new(tokio::io::stdin()),
        io::stdout(),
        shutdown_signal(),
    )
    .await
}

/// Spawns the chat loop over `input`/`output` and races it against `shutdown`.
///
/// When `shutdown` resolves first the loop task is aborted, which drops any
/// request still in flight. If `shutdown` fails the loop keeps running until
/// its input closes.
pub async fn run_with<R, W, S>(client: ApiClient, input: R, output: W, shutdown: S) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: Write + Send + 'static,
    S: Future<Output = io::Result<()>>,
{
    let mut chat = tokio::spawn(async move { run_loop(&client, input, output).await });

    tokio::select! {
        signal = shutdown => match signal {
            Ok(()) => {
                info!("shutdown signal received");
                println!("\n{FAREWELL}");
                chat.abort();
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for shutdown signals");
                (&mut chat).await??;
            }
        },
        joined = &mut chat => {
            joined??;
        }
    }

    Ok(())
}

/// Reads one utterance per line from `input` and writes each reply, or the
/// reason there isn't one, to `output`. Request failures never end the loop;
/// only end of input or an I/O error does. Bytes that aren't valid UTF-8 are
/// replaced with U+FFFD rather than rejected.
pub async fn run_loop<R, W>(client: &ApiClient, mut input: R, mut output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut line = Vec::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            debug!("input closed");
            writeln!(output)?;
            return Ok(());
        }

        let utterance = decode_line(&line);
        let reply = match client.complete(&utterance).await {
            Ok(text) => text,
            Err(e) => e.to_string(),
        };
        writeln!(output, "{REPLY}{reply}")?;
    }
}

fn decode_line(line: &[u8]) -> Cow<'_, str> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}

async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    ctrl_c = tokio::signal::ctrl_c() => ctrl_c,
                    _ = terminate.recv() => Ok(()),
                }
            }
            Err(e) => {
                warn!(error = %e, "unable to listen for SIGTERM, waiting on Ctrl + C only");
                tokio::signal::ctrl_c().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

//! Plays the device controller side of the skill bridge: initializes its
//! skills, answers every call and reports the resulting state.

use std::{collections::HashSet, time::Duration};

use anyhow::{Context, Result};
use bridge::gate::resulting_state;
use clap::Parser;
use shared::{
    domain::{CallResult, SkillState, Verb},
    protocol::{InboundFrame, OutboundFrame},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Address of the device server's skill bridge.
    #[arg(long, default_value = "127.0.0.1:5000")]
    bridge: String,
    #[arg(long = "skill", default_values_t = vec!["Belt1".to_string()])]
    skills: Vec<String>,
    /// Verbs answered with FAILED, e.g. `--fail-verb STOP`.
    #[arg(long = "fail-verb", value_parser = parse_verb)]
    fail_verbs: Vec<Verb>,
    /// Time a call takes before its reply is sent.
    #[arg(long, default_value_t = 200)]
    execution_ms: u64,
}

fn parse_verb(raw: &str) -> Result<Verb, String> {
    Verb::from_wire(&raw.to_ascii_uppercase()).ok_or_else(|| format!("unknown verb `{raw}`"))
}

#[derive(Debug, Clone)]
struct Behavior {
    skills: Vec<String>,
    fail_verbs: HashSet<Verb>,
    execution: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let stream = TcpStream::connect(&cli.bridge)
        .await
        .with_context(|| format!("failed to connect to skill bridge at {}", cli.bridge))?;
    info!(bridge = %cli.bridge, skills = ?cli.skills, "connected");
    let (reader, writer) = stream.into_split();
    let behavior = Behavior {
        skills: cli.skills,
        fail_verbs: cli.fail_verbs.into_iter().collect(),
        execution: Duration::from_millis(cli.execution_ms),
    };
    simulate(reader, writer, &behavior).await
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, frame: InboundFrame) -> Result<()> {
    let line = frame.to_line();
    debug!(%line, "sending");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn simulate<R, W>(reader: R, mut writer: W, behavior: &Behavior) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for skill in &behavior.skills {
        send(&mut writer, InboundFrame::Init { skill: skill.clone() }).await?;
        send(
            &mut writer,
            InboundFrame::Update {
                skill: skill.clone(),
                state: SkillState::Ready.as_str().to_string(),
                info: "initialized".into(),
            },
        )
        .await?;
    }

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let frame = match OutboundFrame::parse(&line) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%line, error = %err, "ignoring unexpected line");
                continue;
            }
        };
        match frame {
            OutboundFrame::Ret { skill, result } => debug!(%skill, %result, "bridge acknowledged"),
            OutboundFrame::Call {
                skill,
                verb,
                parameter,
            } => {
                info!(%skill, %verb, %parameter, "call received");
                tokio::time::sleep(behavior.execution).await;
                let result = if behavior.fail_verbs.contains(&verb) {
                    CallResult::Failed
                } else {
                    CallResult::Ok
                };
                send(
                    &mut writer,
                    InboundFrame::CallReturn {
                        skill: skill.clone(),
                        verb,
                        result,
                    },
                )
                .await?;
                if result.is_ok() {
                    send(
                        &mut writer,
                        InboundFrame::Update {
                            skill,
                            state: resulting_state(verb).as_str().to_string(),
                            info: parameter,
                        },
                    )
                    .await?;
                }
            }
        }
    }
    info!("bridge closed the connection");
    Ok(())
}

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use livegen_core::{init_tracing, run_job, FlowRenderer, FlowUpdate, LivegenConfig};
use livegen_runtime::{ExternalProps, RenderSession, VNode};
use livegen_transport::{JobRequest, TransportSession};
use serde::Serialize;
use std::path::PathBuf;

/// One screen as printed on stdout
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderReport<'a> {
    screen_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<&'a str>,
    view: &'a [VNode],
}

impl<'a> RenderReport<'a> {
    fn of(session: &'a RenderSession, seq: Option<u64>) -> Self {
        Self {
            screen_id: session.screen_id(),
            seq,
            fallback: session.is_fallback(),
            fault: session.fault_summary(),
            view: session.view(),
        }
    }
}

fn cli() -> Command {
    Command::new("livegen")
        .version(livegen_core::VERSION)
        .about("Render streamed, model-generated UI components in a sandbox")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines on stderr"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Raise log verbosity (repeatable)"),
        )
        .subcommand(
            Command::new("render")
                .about("Sanitize, compile and mount a source file, printing its tree as JSON")
                .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
                .arg(screen_arg())
                .arg(
                    Arg::new("props")
                        .long("props")
                        .help("Host props as a JSON object"),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Feed a source file as a fragment stream, printing each checkpoint render")
                .arg(Arg::new("file").required(true).value_parser(value_parser!(PathBuf)))
                .arg(screen_arg())
                .arg(
                    Arg::new("chunk")
                        .long("chunk")
                        .default_value("64")
                        .value_parser(value_parser!(usize))
                        .help("Fragment size in bytes"),
                ),
        )
        .subcommand(
            Command::new("connect")
                .about("Run one generation job against a server and print the final renders")
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .required(true)
                        .help("Server address, HOST:PORT"),
                )
                .arg(
                    Arg::new("token")
                        .long("token")
                        .required(true)
                        .env("LIVEGEN_TOKEN")
                        .help("Credential sent in the handshake"),
                )
                .arg(
                    Arg::new("screen")
                        .long("screen")
                        .required(true)
                        .help("Screen id"),
                )
                .arg(
                    Arg::new("action")
                        .long("action")
                        .default_value("generate")
                        .help("Job action"),
                )
                .arg(
                    Arg::new("param")
                        .long("param")
                        .action(ArgAction::Append)
                        .help("Job parameter as KEY=VALUE (repeatable)"),
                ),
        )
}

fn screen_arg() -> Arg {
    Arg::new("screen")
        .long("screen")
        .default_value("main")
        .help("Screen id")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let Some((command, args)) = matches.subcommand() else {
        anyhow::bail!("a subcommand is required");
    };
    // Global flags are visible on the subcommand wherever they were given
    init_tracing(args.get_flag("json-logs"), args.get_count("verbose"))?;

    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => LivegenConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LivegenConfig::default(),
    };

    match command {
        "render" => render(&config, args),
        "replay" => replay(&config, args),
        "connect" => connect(&config, args).await,
        other => anyhow::bail!("unknown subcommand `{other}`"),
    }
}

fn screen(args: &ArgMatches) -> &str {
    args.get_one::<String>("screen").map_or("main", String::as_str)
}

fn read_source(args: &ArgMatches) -> anyhow::Result<String> {
    let path = args
        .get_one::<PathBuf>("file")
        .context("missing source file")?;
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print(report: &RenderReport<'_>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn render(config: &LivegenConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let text = read_source(args)?;
    let props = match args.get_one::<String>("props") {
        Some(json) => parse_props(json)?,
        None => ExternalProps::new(),
    };
    let screen_id = screen(args);

    let mut flow = FlowRenderer::new(config).with_props(props);
    flow.render_final(screen_id, &text);
    let session = flow.session(screen_id).context("screen was not created")?;
    print(&RenderReport::of(session, None))?;
    if session.is_fallback() {
        std::process::exit(1);
    }
    Ok(())
}

fn replay(config: &LivegenConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let text = read_source(args)?;
    let chunk = args.get_one::<usize>("chunk").copied().unwrap_or(64).max(1);
    let screen_id = screen(args);
    let mut flow = FlowRenderer::new(config);

    for fragment in fragments(&text, chunk) {
        for update in flow.push_fragment(screen_id, fragment) {
            match update {
                FlowUpdate::CheckpointRendered { seq, .. } => {
                    if let Some(session) = flow.session(screen_id) {
                        print(&RenderReport::of(session, Some(seq)))?;
                    }
                }
                FlowUpdate::CheckpointSkipped { seq, reason, .. } => {
                    tracing::warn!(screen_id, seq, %reason, "checkpoint skipped");
                }
                _ => {}
            }
        }
    }

    flow.render_final(screen_id, &text);
    let session = flow.session(screen_id).context("screen was not created")?;
    print(&RenderReport::of(session, None))
}

async fn connect(config: &LivegenConfig, args: &ArgMatches) -> anyhow::Result<()> {
    let addr = args.get_one::<String>("addr").context("missing --addr")?;
    let token = args.get_one::<String>("token").context("missing --token")?;
    let action = args
        .get_one::<String>("action")
        .map_or("generate", String::as_str);

    let mut request = JobRequest::for_screen(action, screen(args));
    for param in args.get_many::<String>("param").into_iter().flatten() {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("--param `{param}` is not KEY=VALUE"))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::from(value));
        request = request.with_param(key, value);
    }

    let mut flow = FlowRenderer::new(config);
    let mut session = TransportSession::connect(addr.as_str(), token.as_str(), config.transport)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let result = run_job(&mut session, &request, &mut flow, interrupted).await;
    for session in flow.sessions() {
        print(&RenderReport::of(session, None))?;
    }
    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report.outcome.result)?);
    Ok(())
}

fn parse_props(json: &str) -> anyhow::Result<ExternalProps> {
    let value: serde_json::Value = serde_json::from_str(json).context("--props is not JSON")?;
    let serde_json::Value::Object(map) = value else {
        anyhow::bail!("--props must be a JSON object");
    };
    let mut props = ExternalProps::new();
    for (key, value) in map {
        props.insert(key, value);
    }
    Ok(props)
}

/// Split on char boundaries into pieces of about `size` bytes
fn fragments(text: &str, size: usize) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end += 1;
        }
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(head)
    })
}

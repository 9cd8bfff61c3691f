use clap::{Args, Parser, Subcommand};
use procvisor::ProcessHost;
use procvisor::io::{
    ChildProcessReader, ChildProcessWriter, ExecuteOptions, ShellMode, SpawnOptions, StdioMode,
};
use procvisor::logging::{LogConfig, init_logging};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

const INPUT_CHUNK: usize = 4096;

/// Run child processes with concurrent stdin/stdout/stderr handling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log file path (overrides PROCVISOR_LOG_FILE env var)
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program to completion and print its captured output
    Exec(ExecArgs),
    /// Run a program interactively, piping this terminal's stdin into it
    Spawn(SpawnArgs),
    /// Print a JSON snapshot of this process
    Info,
}

#[derive(Args, Debug)]
struct SpawnArgs {
    /// Working directory for the child (`~` and relative paths allowed)
    #[arg(long, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Environment variable for the child, may be repeated
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Start the child with an empty environment plus `--env` values
    #[arg(long)]
    clear_env: bool,

    /// Run through a shell; the platform default unless one is named
    #[arg(long, value_name = "SHELL", require_equals = true, num_args = 0..=1)]
    shell: Option<Option<String>>,

    /// Program to run
    program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct ExecArgs {
    #[command(flatten)]
    spawn: SpawnArgs,

    /// Text written to the child's stdin before it is closed
    #[arg(long, value_name = "TEXT")]
    stdin: Option<String>,

    /// Stdout handling: default, inherit, forward or none
    #[arg(long, value_name = "MODE", default_value_t = StdioMode::Default)]
    stdout: StdioMode,

    /// Stderr handling: default, inherit, forward or none
    #[arg(long, value_name = "MODE", default_value_t = StdioMode::Default)]
    stderr: StdioMode,
}

fn parse_env_pair(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))
}

impl SpawnArgs {
    fn to_options(&self) -> SpawnOptions {
        let mut options = SpawnOptions::new().with_clear_env(self.clear_env);
        if let Some(cwd) = &self.cwd {
            options = options.with_cwd(cwd);
        }
        for (key, value) in &self.env {
            options = options.with_env(key, value);
        }
        match &self.shell {
            Some(Some(name)) => options.with_shell(ShellMode::Named(name.clone())),
            Some(None) => options.with_shell(ShellMode::Default),
            None => options,
        }
    }
}

async fn run_exec(host: &ProcessHost, args: ExecArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut options = ExecuteOptions::from(args.spawn.to_options())
        .with_stdout(args.stdout)
        .with_stderr(args.stderr);
    if let Some(input) = args.stdin {
        options = options.with_stdin(input);
    }

    let result = host
        .exec(&args.spawn.program, &args.spawn.args, &options)
        .await?;
    info!(
        "{} finished: ok={} code={}",
        args.spawn.program, result.ok, result.code
    );

    // Forwarded streams were already copied out while the child ran
    if args.stdout == StdioMode::Default {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&result.stdout).await?;
        stdout.flush().await?;
    }
    if args.stderr == StdioMode::Default {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(&result.stderr).await?;
        stderr.flush().await?;
    }

    Ok(result.code)
}

async fn run_spawn(host: &ProcessHost, args: SpawnArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut child = host.create(&args.program, &args.args, &args.to_options())?;
    info!("Spawned {} with PID {:?}", args.program, child.pid());

    let stdout = child.stdout().clone();
    let stderr = child.stderr().clone();

    let output = async {
        tokio::try_join!(
            copy_output(&stdout, tokio::io::stdout()),
            copy_output(&stderr, tokio::io::stderr()),
        )
    };

    // Input ends on EOF but output keeps flowing until the child closes it
    let input = async {
        feed_input(child.stdin()).await;
        std::future::pending::<()>().await
    };

    tokio::select! {
        result = output => { result?; }
        _ = input => {}
    }

    let status = child.status().await;
    info!("{} exited: {:?}", args.program, status);
    Ok(status.code)
}

async fn copy_output<W>(reader: &ChildProcessReader, mut out: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = reader.read(Some(INPUT_CHUNK)).await {
        out.write_all(&chunk).await?;
        out.flush().await?;
    }
    Ok(())
}

async fn feed_input(writer: &mut ChildProcessWriter) {
    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; INPUT_CHUNK];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = writer.write(&buf[..n]).await {
                    debug!("Child stopped accepting input: {}", e);
                    break;
                }
            }
            Err(e) => {
                debug!("Failed to read terminal input: {}", e);
                break;
            }
        }
    }
    writer.close();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env().with_overrides(cli.log_level, cli.log_file);
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let host = ProcessHost::capture()?;

    let code = match cli.command {
        Command::Info => {
            println!("{}", serde_json::to_string_pretty(host.info())?);
            0
        }
        Command::Exec(args) => run_exec(&host, args).await?,
        Command::Spawn(args) => run_spawn(&host, args).await?,
    };

    // Terminal input is read on a blocking thread that cannot be cancelled
    std::process::exit(code);
}

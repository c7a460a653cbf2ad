//! Rindou CLI - インスペクタブリッジのデモ
//!
//! スタブエンジンとインプロセスのパイプトランスポートでブリッジを
//! 末端まで動かします。実行スレッドは裏で起動し、このプロセス自身が
//! デバッグフロントエンドとして振る舞います。

mod stub;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rindou_core::{Agent, ScriptValue};
use rindou_engine::{FunctionHandle, TaskScheduler};
use rindou_host::{pipe, FrontendHandle, HostScheduler, PipeFactory};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::rc::Rc;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Rindou - Inspector Bridge Demo
#[derive(Parser)]
#[command(name = "rindou")]
#[command(version = "0.1.0")]
#[command(about = "Bridge between a debugging frontend and a script engine", long_about = None)]
struct Cli {
    /// Listen path handed to the transport (empty means no path)
    #[arg(long, default_value = "")]
    path: String,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: DemoCommand,
}

#[derive(Subcommand)]
enum DemoCommand {
    /// Run a scripted debug session against the stub engine
    Demo,

    /// Drive the bridge interactively, one protocol frame per line
    Repl,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    println!("Rindou - Inspector Bridge Demo");
    println!("Version 0.1.0");
    println!();

    let (execution, frontend) = spawn_execution_thread(cli.path.clone());

    let result = match cli.command {
        DemoCommand::Demo => run_demo(&frontend),
        DemoCommand::Repl => run_repl(&frontend),
    };

    // フロントエンドの端を落とすと実行スレッドが畳まれる
    drop(frontend);
    execution.join().expect("execution thread panicked")?;

    result
}

/// ログ出力を初期化する
fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 実行スレッドを起動し、フロントエンド側の端を受け取る
///
/// エージェントはスレッド親和なので、パイプもエージェントも実行スレッドの
/// 中で組み立て、Send 可能なフロントエンドの端だけをこちらへ渡します。
fn spawn_execution_thread(path: String) -> (thread::JoinHandle<Result<()>>, FrontendHandle) {
    let (handle_tx, handle_rx) = mpsc::channel();
    let execution = thread::spawn(move || -> Result<()> {
        let (factory, frontend) = pipe();
        handle_tx
            .send(frontend)
            .map_err(|_| anyhow::anyhow!("failed to hand over the frontend handle"))?;
        run_execution_loop(&path, factory)
    });
    let frontend = handle_rx
        .recv()
        .expect("execution thread died during startup");
    (execution, frontend)
}

/// 埋め込み側の実行ループ
///
/// エージェントを起動し、スクリプト冒頭のデバッガエントリ呼び出しを
/// 模倣してから、フロントエンドが切断するまでイベントソースを回します。
fn run_execution_loop(path: &str, factory: PipeFactory) -> Result<()> {
    let scheduler = Arc::new(HostScheduler::new());
    let env = Rc::new(stub::StubEnvironment::default());
    let agent = Agent::new(
        scheduler.waker(),
        Box::new(factory.clone()),
        Box::new(stub::StubBackendFactory::default()),
    );
    agent.start(env.clone(), scheduler.clone(), path)?;

    let delegate = factory.delegate(&agent);
    agent.connect(delegate);

    // スクリプトが callAndPauseOnStart を呼んだところを模倣する。
    // 次に届くフレームの処理で Break on start の一時停止に入る
    env.invoke_global(
        "callAndPauseOnStart",
        &[ScriptValue::Function(FunctionHandle::new(1))],
    )?;

    while agent.is_connected() {
        while scheduler.pump_foreground_task() {}
        scheduler.run_interrupt_checkpoint();
        agent.poll_start_request();
        while let Some(frame) = factory.try_recv() {
            agent.dispatch(&frame);
        }
        scheduler.wait_for_wake(Duration::from_millis(20));
    }

    agent.wait_for_disconnect();
    agent.stop();
    Ok(())
}

/// 台本どおりのデバッグセッションを実行する
fn run_demo(frontend: &FrontendHandle) -> Result<()> {
    println!("Running scripted debug session...");
    println!();

    // 最初のフレームで Break on start の一時停止に入る
    send_frame(frontend, "{\"id\":1,\"method\":\"Runtime.enable\"}")?;
    drain_replies(frontend);

    // 一時停止中もブリッジはフレームを受け付けている
    send_frame(frontend, "{\"id\":2,\"method\":\"Debugger.getScriptSource\"}")?;
    drain_replies(frontend);

    // 再開すると制御がスクリプトへ戻る
    send_frame(frontend, "{\"id\":3,\"method\":\"Debugger.resume\"}")?;
    drain_replies(frontend);

    println!();
    println!("Session finished, detaching frontend");
    Ok(())
}

/// フロントエンドの対話ループを実行する
fn run_repl(frontend: &FrontendHandle) -> Result<()> {
    println!("Type one protocol frame per line, 'quit' to exit.");
    println!("An empty line drains pending replies.");
    println!();
    println!("Try:");
    println!("  {{\"id\":1,\"method\":\"Debugger.pause\"}}");
    println!("  {{\"id\":2,\"method\":\"Debugger.resume\"}}");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(rindou) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    drain_replies(frontend);
                    continue;
                }
                if line == "quit" || line == "q" || line == "exit" {
                    break;
                }

                rl.add_history_entry(line)?;

                if let Err(e) = frontend.send(line) {
                    eprintln!("Error: {}", e);
                    break;
                }
                drain_replies(frontend);
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn send_frame(frontend: &FrontendHandle, frame: &str) -> Result<()> {
    println!("--> {}", frame);
    frontend.send(frame)?;
    Ok(())
}

/// ブリッジからの応答をしばらく受けて表示する
fn drain_replies(frontend: &FrontendHandle) {
    while let Some(reply) = frontend.recv_timeout(Duration::from_millis(300)) {
        println!("<-- {}", reply);
    }
}

// KeyProbe - 命令行入口
// 参数处理保持最简：keyprobe <key-file> [host-id [wordlist]]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use zeroize::Zeroizing;

use keyprobe::constants::{PASSPHRASE_ENV, RUNTIME_THREAD_NAME};
use keyprobe::services::{storage, wordlist};
use keyprobe::{
    DiscoveryEvent, Error, HostKeyStore, KeyAnalyzer, KeyMaterial, RepositoryDiscoverer,
    ServerValidator, SshRepositoryProbe, ValidationResult,
};

const USAGE: &str = "usage: keyprobe <key-file> [host-id [wordlist]]";

struct Args {
    key_path: PathBuf,
    host_id: Option<String>,
    wordlist: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [key] => Some(Args {
            key_path: key.into(),
            host_id: None,
            wordlist: None,
        }),
        [key, host] => Some(Args {
            key_path: key.into(),
            host_id: Some(host.clone()),
            wordlist: None,
        }),
        [key, host, list] => Some(Args {
            key_path: key.into(),
            host_id: Some(host.clone()),
            wordlist: Some(list.into()),
        }),
        _ => None,
    }
}

fn main() -> Result<()> {
    // 初始化日志系统，输出到 stderr，stdout 只留给 JSON 结果
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=keyprobe=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(RUNTIME_THREAD_NAME)
        .build()
        .context("无法创建 tokio 运行时")?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let settings = storage::load_settings()?;
    let analyzer = KeyAnalyzer::new(storage::build_weak_key_database(&settings)?);

    let passphrase = std::env::var(PASSPHRASE_ENV).ok().map(Zeroizing::new);
    let bytes = Zeroizing::new(
        std::fs::read(&args.key_path)
            .with_context(|| format!("无法读取密钥文件 {}", args.key_path.display()))?,
    );
    let key = analyzer.load(&bytes, passphrase.as_deref().map(String::as_str))?;
    print_json(&analyzer.assess(&key))?;

    let Some(host_id) = args.host_id else {
        return Ok(());
    };

    let registry = storage::build_registry(&settings)?;
    let profile = registry.resolve(&host_id)?;
    let store = Arc::new(storage::load_host_key_store(&settings)?);
    let config = settings.probe.to_probe_config();

    let validator = ServerValidator::new(analyzer, store.clone(), config);
    let validation = validator
        .validate(&key, &profile, settings.probe.validation_timeout())
        .await?;
    print_json(&validation)?;
    storage::save_host_key_store(&settings, &store)?;

    match args.wordlist {
        Some(path) if validation.is_accepted() => {
            discover(&settings, &validator, &key, &validation, &path, &store).await
        }
        Some(_) => {
            info!("key was not accepted by {}, skipping discovery", profile.id);
            Ok(())
        }
        None => Ok(()),
    }
}

async fn discover(
    settings: &keyprobe::models::AppSettings,
    validator: &ServerValidator,
    key: &KeyMaterial,
    validation: &ValidationResult,
    path: &Path,
    store: &Arc<HostKeyStore>,
) -> Result<()> {
    let registry = storage::build_registry(settings)?;
    let profile = registry.resolve(&validation.host_id)?;
    let private_key = key.private_key().cloned().ok_or(Error::PrivateKeyRequired)?;
    let probe = Arc::new(SshRepositoryProbe::new(
        profile.clone(),
        private_key,
        store.clone(),
        validator.config().clone(),
    ));

    let discoverer = RepositoryDiscoverer::new(settings.discovery.to_options())?;
    let candidates =
        wordlist(path).with_context(|| format!("无法读取字典文件 {}", path.display()))?;
    let mut handle = discoverer.start(validation, profile, probe, candidates)?;

    if let Some(mut events) = handle.take_events() {
        while let Some(event) = events.recv().await {
            match &event {
                DiscoveryEvent::Outcome(outcome) if outcome.reachable => {
                    info!("accessible: {}", outcome.name)
                }
                DiscoveryEvent::Retrying { name, attempt, .. } => {
                    info!("retrying {} (attempt {})", name, attempt)
                }
                _ => {}
            }
        }
    }

    print_json(&handle.join().await)?;
    storage::save_host_key_store(settings, store)?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("无法序列化结果")?;
    println!("{}", json);
    Ok(())
}

// 常量

/// 配置目录名
pub const APP_DIR: &str = "keyprobe";

/// 读取密钥口令的环境变量
pub const PASSPHRASE_ENV: &str = "KEYPROBE_PASSPHRASE";

/// 二进制 tokio 运行时的线程名
pub const RUNTIME_THREAD_NAME: &str = "keyprobe-worker";

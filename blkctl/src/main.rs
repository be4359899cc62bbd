use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use blkctl::{commands, logger, CliError, Config, FileBackend};
use block_io::BlockIo;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "blkctl", version, about = "Block-cached file I/O tool")]
struct Cli {
    /// 配置文件路径
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// 覆盖配置中的缓存容量（块数）
    #[arg(long)]
    capacity: Option<usize>,
    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 读取文件内容到 stdout
    Read {
        path: String,
        #[arg(default_value_t = 0)]
        offset: u64,
        /// 省略时读到文件末尾
        len: Option<usize>,
    },
    /// 在指定偏移写入字符串
    Write {
        path: String,
        offset: u64,
        data: String,
    },
    /// 复制文件
    Copy { src: String, dst: String },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    logger::init(cli.log_level.as_deref().unwrap_or(&config.log.level));
    let capacity = cli.capacity.unwrap_or(config.cache.capacity);
    log::debug!(
        "cache capacity {} blocks, storage root {}",
        capacity,
        config.storage.root.display()
    );

    let backend = FileBackend::new(config.storage.root, config.storage.write_through);
    let mut io = BlockIo::new(backend, capacity);
    match cli.command {
        Command::Read { path, offset, len } => {
            let data = commands::read(&mut io, &path, offset, len)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Command::Write { path, offset, data } => {
            commands::write(&mut io, &path, offset, data.as_bytes())?;
        }
        Command::Copy { src, dst } => {
            let copied = commands::copy(&mut io, &src, &dst)?;
            println!("{} bytes", copied);
        }
    }
    io.close_all()?;
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("blkctl: {}", err);
            ExitCode::FAILURE
        }
    }
}

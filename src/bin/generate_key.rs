//! Record key generation utility.
//!
//! Generates a random AES-256 record key and writes it as 64 hex digits:
//! - Key file written with 0600 permissions
//! - Only the key fingerprint is printed
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin generate_key -- --out <path> [--force]
//! ```
//!
//! # Security
//!
//! - Uses OS entropy (OsRng) for key generation
//! - Key bytes are zeroized from memory after use
//! - Output file has restricted permissions (Unix only)

use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use anyhow::{bail, Context, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use medledger::domain::{DecryptionKey, KEY_LEN};

const USAGE: &str = "Usage: generate_key --out <path> [--force]";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut out_path: Option<std::path::PathBuf> = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => {
                let p = args.next().unwrap_or_default();
                if p.is_empty() {
                    eprintln!("{USAGE}");
                    std::process::exit(2);
                }
                out_path = Some(std::path::PathBuf::from(p));
            }
            "--force" => force = true,
            "-h" | "--help" => {
                println!(
                    "{USAGE}\n\nWrites a random 256-bit record key as hex to <path> with 0600 permissions. Prints only the key fingerprint."
                );
                return Ok(());
            }
            _ => {
                eprintln!("Unknown arg: {arg}\n{USAGE}");
                std::process::exit(2);
            }
        }
    }

    let Some(out_path) = out_path else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    if out_path.exists() && !force {
        bail!("Refusing to overwrite existing file {:?}. Use --force.", out_path);
    }

    let mut key_bytes = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(&mut key_bytes[..]);
    let key_hex = Zeroizing::new(hex::encode(&key_bytes[..]));
    let fingerprint = DecryptionKey::parse(&key_hex)?.fingerprint();

    if let Some(parent) = out_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        opts.mode(0o600);
    }

    let mut file = opts
        .open(&out_path)
        .with_context(|| format!("Failed to open {:?}", out_path))?;
    file.write_all(key_hex.as_bytes())?;
    file.write_all(b"\n")?;

    println!("Wrote record key to {:?}", out_path);
    println!("Key fingerprint: {fingerprint}");
    Ok(())
}

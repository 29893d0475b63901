//! hmac-verify - offline HMAC-SHA256 file checker
//!
//! Generates a tag for a local file, or verifies one against a tag given on
//! the command line or read from a `.hmac` sidecar.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hmac_uploader_server::integrity::{self, Tag};
use hmac_uploader_server::sidecar;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "hmac-verify")]
#[command(about = "Verify file integrity using HMAC-SHA256")]
#[command(version)]
#[command(after_help = "Examples:\n  \
    hmac-verify document.txt mysecretkey\n  \
    hmac-verify document.txt mysecretkey W9zBRr9gdU5q...\n  \
    hmac-verify document.txt --hmac-file document.txt.hmac")]
struct Args {
    /// File to hash or verify
    file: PathBuf,

    /// Secret key; prompted for when only --hmac-file is given
    secret_key: Option<String>,

    /// Expected base64 tag; omit to generate one
    hmac: Option<String>,

    /// Read the expected tag from a .hmac sidecar file
    #[arg(long, value_name = "PATH")]
    hmac_file: Option<PathBuf>,

    /// In generate mode, write <FILE>.hmac next to the file
    #[arg(long)]
    save: bool,

    /// Minimal output
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the requested operation succeeded
fn run(args: &Args) -> anyhow::Result<bool> {
    if !args.quiet {
        println!("HMAC File Verifier");
        println!("{}", "=".repeat(50));
    }

    if !args.file.is_file() {
        bail!("'{}' is not a readable file", args.file.display());
    }

    if let Some(hmac_file) = &args.hmac_file {
        if !args.quiet {
            println!("Reading HMAC file: {}", hmac_file.display());
        }

        let text = std::fs::read_to_string(hmac_file)
            .with_context(|| format!("cannot read HMAC file '{}'", hmac_file.display()))?;
        let parsed = sidecar::parse(&text)?;

        let key = match &args.secret_key {
            Some(key) => key.clone(),
            None => prompt_key()?,
        };
        if key.is_empty() {
            bail!("secret key is required");
        }

        return verify(args, &key, &parsed.tag);
    }

    let key = match &args.secret_key {
        Some(key) if !key.is_empty() => key,
        _ => bail!("secret key is required\nUsage: hmac-verify <FILE> <SECRET_KEY> [HMAC]"),
    };

    match &args.hmac {
        Some(expected) => verify(args, key, expected),
        None => generate(args, key),
    }
}

fn generate(args: &Args, key: &str) -> anyhow::Result<bool> {
    let (tag, size) = tag_file(&args.file, key)?;

    if args.quiet {
        println!("{}", tag);
    } else {
        println!("File: {}", args.file.display());
        println!("Secret Key: {}", mask(key));
        println!();
        println!("HMAC generated");
        println!("File Size: {} bytes", size);
        println!("HMAC-SHA256: {}", tag);
    }

    if args.save {
        let sidecar_path = sidecar_path(&args.file);
        let file_name = args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = sidecar::render_local(&file_name, &tag.to_base64(), size, "hmac-verify");

        std::fs::write(&sidecar_path, text)
            .with_context(|| format!("cannot write '{}'", sidecar_path.display()))?;

        if !args.quiet {
            println!("HMAC saved to '{}'", sidecar_path.display());
        }
    }

    Ok(true)
}

fn verify(args: &Args, key: &str, expected: &str) -> anyhow::Result<bool> {
    let expected = expected.trim();
    let (calculated, size) = tag_file(&args.file, key)?;
    let is_valid = integrity::compare(&calculated.to_base64(), expected);

    if args.quiet {
        println!("{}", if is_valid { "PASSED" } else { "FAILED" });
        return Ok(is_valid);
    }

    println!("File: {}", args.file.display());
    println!("Secret Key: {}", mask(key));
    println!("Expected HMAC: {}", abbreviate(expected));
    println!();
    println!("Verification Results:");
    println!("   File Size:  {} bytes", size);
    println!("   Expected:   {}", expected);
    println!("   Calculated: {}", calculated);
    println!();

    if is_valid {
        println!("VERIFICATION PASSED");
        println!("File integrity confirmed: file is authentic and unmodified");
    } else {
        println!("VERIFICATION FAILED");
        println!("File may have been tampered with, or the key or HMAC is wrong");
    }

    Ok(is_valid)
}

fn tag_file(path: &Path, key: &str) -> anyhow::Result<(Tag, u64)> {
    let content =
        std::fs::read(path).with_context(|| format!("cannot read '{}'", path.display()))?;
    let size = content.len() as u64;
    tracing::debug!(path = %path.display(), size, "Computing tag");
    Ok((integrity::compute_tag(&content, key.as_bytes()), size))
}

fn prompt_key() -> anyhow::Result<String> {
    print!("Enter secret key: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read secret key")?;
    Ok(line.trim().to_string())
}

fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(sidecar::SIDECAR_EXTENSION);
    PathBuf::from(name)
}

fn mask(key: &str) -> String {
    "*".repeat(key.chars().count())
}

/// First and last 16 characters of a long tag
fn abbreviate(tag: &str) -> String {
    if tag.len() > 32 && tag.is_ascii() {
        format!("{}...{}", &tag[..16], &tag[tag.len() - 16..])
    } else {
        tag.to_string()
    }
}

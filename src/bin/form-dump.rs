//! Decode a captured request body and print the nested trees as JSON.

use anyhow::Context;
use clap::Parser;
use form_tree::{Config, FormRequest, parse_data, parse_query, parse_uploads};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "form-dump")]
#[command(about = "Show how form fields nest into request trees", long_about = None)]
struct Cli {
    /// Request body file (reads stdin when omitted)
    #[arg(name = "BODY")]
    body: Option<PathBuf>,

    /// Content-Type header of the request
    #[arg(short = 't', long, default_value = "application/x-www-form-urlencoded")]
    content_type: String,

    /// Request method
    #[arg(short = 'm', long, default_value = "POST")]
    method: String,

    /// URL query string (without the leading '?')
    #[arg(short = 'q', long, default_value = "")]
    query: String,

    /// Owner uid for uploaded files (defaults to the current user)
    #[arg(long)]
    uid: Option<u32>,

    /// Owner gid for uploaded files (defaults to the current group)
    #[arg(long)]
    gid: Option<u32>,

    /// Directory for spooled uploads
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Keep spooled uploads on disk after printing
    #[arg(short = 'k', long)]
    keep: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let body = match &cli.body {
        Some(path) => fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let config = Config {
        tmp_dir: cli.tmp_dir.clone(),
        max_file_size: cli.max_file_size,
    };

    let request = FormRequest::from_body(&cli.method, &cli.content_type, &cli.query, &body, &config)?;

    // SAFETY: getuid/getgid cannot fail and touch no memory.
    let uid = cli.uid.unwrap_or_else(|| unsafe { libc::getuid() });
    let gid = cli.gid.unwrap_or_else(|| unsafe { libc::getgid() });

    let result = parse_uploads(&request, uid, gid).and_then(|uploads| {
        Ok(serde_json::json!({
            "query": parse_query(&request)?,
            "data": parse_data(&request)?,
            "files": uploads,
        }))
    });

    if !cli.keep {
        if let Some(multipart) = &request.multipart {
            multipart.remove_all();
        }
    }

    match result {
        Ok(json) => {
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("[form-dump] {}", e);
            eprintln!("[form-dump] tree: {}", e.tree);
            std::process::exit(1);
        }
    }
}

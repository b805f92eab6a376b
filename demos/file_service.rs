use std::path::PathBuf;

use structopt::StructOpt;

use resthttp::prelude::*;
use resthttp::server::TcpServer;

#[derive(Debug, StructOpt)]
#[structopt(name = "file_service", about = "Example file server.")]
struct Opt {
    #[structopt(short, long, default_value = "8080")]
    port: u16,
    #[structopt(short, long, parse(from_os_str), default_value = "./")]
    dir: PathBuf,
    #[structopt(long, default_value = "1")]
    threads: usize,
    #[structopt(long, default_value = "10")]
    timeout: u64,
    /// List directories without an index.html
    #[structopt(long)]
    autoindex: bool,
    #[structopt(long)]
    no_compression: bool,
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,
}

fn main() {
    let opt = Opt::from_args();

    stderrlog::new()
        .module(module_path!())
        .module("resthttp")
        .verbosity(opt.verbose)
        .timestamp(stderrlog::Timestamp::Millisecond)
        .init()
        .unwrap();

    let serve_dir = opt.dir.canonicalize().unwrap();
    let mut routes = Routes::new();
    routes.set_default_web_server(&serve_dir, serde_json::json!({ "autoindex": opt.autoindex }));
    let options = ServerOptions::default()
        .with_threads(opt.threads)
        .with_timeout_secs(opt.timeout)
        .with_compression(!opt.no_compression);
    let mut server = TcpServer::new(&format!("0.0.0.0:{}", opt.port), routes, options).unwrap();
    println!(
        "Serving {0}, check out: http://localhost:{1}",
        &serve_dir.to_string_lossy(),
        opt.port
    );
    server.serve_forever();
}

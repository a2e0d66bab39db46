#[tokio::main]
async fn main() {
    if let Err(err) = postflag::run(std::env::args().collect()).await {
        eprintln!("postflag: {err:#}");
        std::process::exit(1);
    }
}

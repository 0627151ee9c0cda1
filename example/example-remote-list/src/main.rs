#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

mod app;

use flowlink_runtime::utils::thread::async_runtime;

fn main() {
    let runtime = match async_runtime("remote-list") {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("build async runtime error. {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(app::run()) {
        error!("remote list job error. {}", e);
        eprintln!("remote list job error. {}", e);
        std::process::exit(1);
    }
}

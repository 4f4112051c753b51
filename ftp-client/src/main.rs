mod app;
mod config;
mod terminal;

use app::App;

fn main() {
    if let Err(err) = App::run() {
        eprint!("{}", err);
        std::process::exit(1);
    }
}

//! Live compile and interpolation pipeline for font sources, driving fontc
//! from a background worker.

use fontlive::core;

fn main() {
    let cli_args = core::platform::get_cli_args();
    if let Err(error) = core::run_app(cli_args) {
        core::platform::handle_error(error);
    }
}

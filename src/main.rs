use flat_shapes::{exit_code, run, Shape};
use log::error;
use std::process;

fn main() {
    flat_shapes::init_logging();

    let result = run(Shape::Triangle);
    if let Err(err) = &result {
        error!("{:#}", err);
    }
    process::exit(exit_code(&result));
}

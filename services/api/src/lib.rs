mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use class_cancel::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

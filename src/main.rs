/*
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use shardd::config::Config;
use std::process::ExitCode;

fn config_path() -> String {
    std::env::args().nth(1).unwrap_or_else(|| "shardd.yaml".to_owned())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = config_path();
    let config = match Config::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load configuration from {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = shardd::arbiter::run(config).await {
        log::error!("server exited with an error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

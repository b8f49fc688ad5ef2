pub mod config;
pub mod handler;

use std::net::SocketAddr;

use crate::app::config::AppConfig;
use crate::app::handler::AppHandler;
use crate::error::Error;
use crate::server::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppState {
    Running,
    Stopped,
}

pub struct App {
    server: Server,
    state: AppState,
}

impl App {
    pub async fn start(config: AppConfig) -> Result<App, Error> {
        tracing::debug!(?config, "starting app");
        Ok(Self {
            server: Server::start(&config.server, AppHandler::new()).await?,
            state: AppState::Running,
        })
    }

    pub async fn stop(&mut self) {
        if self.state == AppState::Running {
            self.server.stop().await;
            self.state = AppState::Stopped;
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpStream;

    use super::{App, AppState};
    use crate::app::config::{AppConfig, ServerConfig};

    #[tokio::test]
    async fn stop_is_idempotent() {
        let config = AppConfig {
            server: ServerConfig {
                port: 0,
                ..ServerConfig::default()
            },
        };
        let mut app = App::start(config).await.unwrap();
        assert_eq!(app.state, AppState::Running);
        TcpStream::connect(app.local_addr()).await.unwrap();

        app.stop().await;
        assert_eq!(app.state, AppState::Stopped);
        app.stop().await;
        assert_eq!(app.state, AppState::Stopped);
    }
}

use std::sync::Arc;

use tracing::{debug, info};

use anubis_core::notice::Notice;
use anubis_core::{
    ChatService, ClientConfig, ClientError, RegistrationValidator, SyncEvent, Workspace,
    WorkspaceUpdate,
};
use anubis_types::api::Credentials;
use anubis_types::models::AccountId;

use crate::command::{Command, HELP};
use crate::render;

/// Whether the input loop keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    service: Arc<dyn ChatService>,
    config: ClientConfig,
    workspace: Workspace,
}

impl App {
    pub fn new(service: Arc<dyn ChatService>, config: ClientConfig) -> Self {
        let workspace = Workspace::new(Arc::clone(&service), config.sync.clone());
        Self {
            service,
            config,
            workspace,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub async fn handle(&mut self, command: Command) -> Flow {
        let result = match command {
            Command::Quit => {
                self.workspace.sign_out().await;
                return Flow::Quit;
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Register {
                username,
                email,
                password,
            } => self.register(&username, &email, &password).await,
            Command::Login { login, password } => self.login(login, password).await,
            Command::Logout => {
                self.workspace.sign_out().await;
                println!("{}", render::notice(&Notice::info("Signed out")));
                Ok(())
            }
            Command::Servers => {
                let ws = &self.workspace;
                print_lines(render::servers(ws.servers(), ws.current_server()));
                Ok(())
            }
            Command::Server(n) => self.switch_server(n).await,
            Command::Channels => {
                self.print_channels();
                Ok(())
            }
            Command::Channel(n) => self.open_channel(n).await,
            Command::NewServer(name) => self.workspace.create_server(&name, None).await.map(|_| {
                println!("{}", render::notice(&Notice::success(format!("Created {}", name))));
            }),
            Command::NewChannel { name, kind } => {
                self.workspace.create_channel(&name, kind).await.map(|_| {
                    self.print_channels();
                })
            }
            Command::Online => {
                println!("{} online", self.workspace.online_count());
                print_lines(render::roster(self.workspace.roster()));
                Ok(())
            }
            Command::Say(text) => self.workspace.send(&text).await.map(|id| {
                debug!("sent {}", id);
            }),
        };

        if let Err(e) = result {
            println!("{}", render::notice(&Notice::from(&e)));
        }
        Flow::Continue
    }

    async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let mut validator =
            RegistrationValidator::new(Arc::clone(&self.service), &self.config.registration);
        validator.set_username(username);
        validator.set_email(email);
        validator.set_password(password);
        validator.set_confirm(password);
        validator.settle().await;

        print_lines(render::form(validator.form(), validator.strength()));
        let account_id = validator.submit().await?;
        info!("Registered {}", account_id);
        println!(
            "{}",
            render::notice(&Notice::success("Account created, /login to continue"))
        );
        Ok(())
    }

    async fn login(&mut self, login: String, password: String) -> Result<(), ClientError> {
        let session = self
            .workspace
            .sign_in(&Credentials { login, password })
            .await?;
        println!(
            "{}",
            render::notice(&Notice::success(format!("Welcome, {}", session.username)))
        );
        self.print_channels();
        Ok(())
    }

    async fn switch_server(&mut self, n: usize) -> Result<(), ClientError> {
        let Some(server) = self.workspace.servers().get(n - 1) else {
            println!("{}", render::notice(&Notice::warning("No such server")));
            return Ok(());
        };
        let id = server.id.clone();
        self.workspace.switch_server(&id).await?;
        self.print_channels();
        Ok(())
    }

    async fn open_channel(&mut self, n: usize) -> Result<(), ClientError> {
        let Some(channel) = self.workspace.channels().get(n - 1) else {
            println!("{}", render::notice(&Notice::warning("No such channel")));
            return Ok(());
        };
        let id = channel.id.clone();
        self.workspace.open_channel(&id).await
    }

    fn print_channels(&self) {
        let ws = &self.workspace;
        let active = ws
            .sync()
            .active_channel()
            .and_then(|id| ws.channels().iter().find(|c| &c.id == id));
        print_lines(render::channels(ws.channels(), active));
    }

    fn author_name(&self, author_id: &AccountId) -> String {
        if let Some(session) = self.workspace.session() {
            if &session.account_id == author_id {
                return session.username.clone();
            }
        }
        self.workspace
            .roster()
            .iter()
            .find(|u| &u.id == author_id)
            .map(|u| u.username.clone())
            .unwrap_or_else(|| author_id.to_string())
    }

    pub fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Render { messages, .. } => {
                println!("----");
                for m in messages.iter() {
                    println!("{}", render::message(m, &self.author_name(&m.author_id)));
                }
            }
            SyncEvent::NewMessage { own: false, .. } => print!("\x07"),
            SyncEvent::NewMessage { .. } => {}
            SyncEvent::Notice(notice) => println!("{}", render::notice(notice)),
        }
    }

    pub fn on_update(&self, update: WorkspaceUpdate) {
        match update {
            WorkspaceUpdate::Presence { online } => debug!("{} online", online),
            other => debug!("update: {:?}", other),
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

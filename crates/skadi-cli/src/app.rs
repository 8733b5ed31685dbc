use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::join_all;
use tracing::{debug, warn};

use skadi_core::auth::{restore_cookies, Session};
use skadi_core::models::{filter_members, MemberForm, Role, User};
use skadi_core::navigation::tabs_for_role;
use skadi_core::utils::{format_phone, truncate_string};
use skadi_core::{
    Access, AuthHooks, AuthPipeline, Config, CredentialStore, RouteGuard, SessionService,
};

use crate::cli::{Command, MembersCommand, NewMember};
use crate::keychain::PasswordVault;

/// Width of the name column in member listings
const NAME_COLUMN_WIDTH: usize = 30;

/// Reacts to an unrecoverable session by signing the user out locally
struct CliHooks {
    store: CredentialStore,
    expired: AtomicBool,
}

impl AuthHooks for CliHooks {
    fn on_auth_failure(&self) {
        warn!("Session could not be refreshed");
        self.store.clear();
        self.expired.store(true, Ordering::SeqCst);
    }
}

pub struct App {
    config: Config,
    session: Session,
    pipeline: AuthPipeline,
    hooks: Arc<CliHooks>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(base_url = %config.api_base_url, "Config loaded");

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        let mut session = Session::new(cache_dir);
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session file");
        }

        let credential = session
            .data
            .as_ref()
            .map(|data| data.credential())
            .unwrap_or_default();
        let store = CredentialStore::with_credential(credential);

        let pipeline = AuthPipeline::new(config.clone(), store.clone())?;
        if let Some(cookies) = session.data.as_ref().and_then(|d| d.cookies.as_deref()) {
            restore_cookies(pipeline.cookies(), &config.url(&config.endpoints.refresh), cookies);
        }

        let hooks = Arc::new(CliHooks {
            store,
            expired: AtomicBool::new(false),
        });
        pipeline.install_hooks(hooks.clone())?;

        Ok(Self {
            config,
            session,
            pipeline,
            hooks,
        })
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        let result = match command {
            Command::Login { username, remember } => self.login(username, remember).await,
            Command::Logout { forget } => self.logout(forget).await,
            Command::WhoAmI => self.whoami().await,
            Command::Tabs => self.tabs().await,
            Command::Members { command } => match command {
                MembersCommand::List { search, role, json } => {
                    self.list_members(search.as_deref(), role, json).await
                }
                MembersCommand::Show { ids } => self.show_members(&ids).await,
                MembersCommand::Create(member) => self.create_member(member).await,
                MembersCommand::Delete { id } => self.delete_member(id).await,
            },
        };

        self.persist();
        result
    }

    /// Write the session back to disk, or drop it once the user is signed out
    fn persist(&mut self) {
        let store = self.pipeline.store();
        if self.hooks.expired.load(Ordering::SeqCst) {
            eprintln!("Session expired, run `skadi login` to sign in again.");
        }

        if !store.is_authenticated() {
            if let Err(e) = self.session.clear() {
                warn!(error = %e, "Failed to remove session file");
            }
            return;
        }

        let refresh_url = self.config.url(&self.config.endpoints.refresh);
        self.session
            .capture(store, self.pipeline.cookies(), &refresh_url, None);
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to save session");
        }
    }

    async fn login(&mut self, username: Option<String>, remember: bool) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(name) => name,
            None => prompt_username()?,
        };
        if username.is_empty() {
            bail!("Username required");
        }

        let password = match PasswordVault::recall(&username) {
            Some(password) if !remember => {
                debug!("Using remembered password");
                password
            }
            _ => rpassword::prompt_password("Password: ")?,
        };

        let user = SessionService::new(&self.pipeline)
            .sign_in(&username, &password)
            .await
            .context("Sign in failed")?;

        if remember {
            if let Err(e) = PasswordVault::remember(&username, &password) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_username = Some(username.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        let refresh_url = self.config.url(&self.config.endpoints.refresh);
        self.session.capture(
            self.pipeline.store(),
            self.pipeline.cookies(),
            &refresh_url,
            Some(username),
        );

        println!("Signed in as {} ({})", user.display_name(), user.role.display_name());
        Ok(())
    }

    async fn logout(&mut self, forget: bool) -> Result<()> {
        SessionService::new(&self.pipeline).logout().await;

        if forget {
            let username = self
                .session
                .username()
                .map(str::to_string)
                .or_else(|| self.config.last_username.clone());
            if let Some(username) = username {
                PasswordVault::forget(&username)?;
            }
        }

        println!("Signed out");
        Ok(())
    }

    async fn require_session(&self) -> Result<(Role, Option<User>)> {
        resolve_session(&self.pipeline).await
    }

    async fn require_admin(&self) -> Result<()> {
        let (role, _) = self.require_session().await?;
        if role != Role::Admin {
            bail!("Member administration requires the {} role", Role::Admin.display_name());
        }
        Ok(())
    }

    async fn whoami(&self) -> Result<()> {
        let user = match self.require_session().await? {
            (_, Some(user)) => user,
            (_, None) => self.pipeline.fetch_me().await?,
        };
        print_member(&user);
        Ok(())
    }

    async fn tabs(&self) -> Result<()> {
        let (role, _) = self.require_session().await?;

        let tabs = tabs_for_role(role);
        if tabs.is_empty() {
            println!("No personal-area tabs for {}", role.display_name());
        }
        for tab in tabs {
            println!("{}", tab.title());
        }
        Ok(())
    }

    async fn list_members(&self, search: Option<&str>, role: Option<Role>, json: bool) -> Result<()> {
        self.require_admin().await?;

        let members = self.pipeline.fetch_members().await?;
        let shown = filter_members(&members, search.unwrap_or(""), role);

        if json {
            println!("{}", serde_json::to_string_pretty(&shown)?);
            return Ok(());
        }

        println!("{:>5}  {:<20} {:<8} {:<30} PHONE", "ID", "USERNAME", "ROLE", "NAME");
        for user in &shown {
            let phone = user
                .profile
                .as_ref()
                .and_then(|p| p.contact.as_ref())
                .map(|c| format_phone(&c.phone))
                .unwrap_or_default();
            println!(
                "{:>5}  {:<20} {:<8} {:<30} {}",
                user.id,
                truncate_string(&user.username, 20),
                user.role.as_str(),
                truncate_string(user.display_name(), NAME_COLUMN_WIDTH),
                phone
            );
        }
        println!("{} of {} members", shown.len(), members.len());
        Ok(())
    }

    async fn show_members(&self, ids: &[i64]) -> Result<()> {
        self.require_admin().await?;

        let results = join_all(ids.iter().map(|&id| self.pipeline.fetch_member(id))).await;
        let mut failed = 0;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(user) => print_member(&user),
                Err(e) => {
                    failed += 1;
                    eprintln!("Member {}: {}", id, e);
                }
            }
        }
        if failed > 0 {
            bail!("{} of {} members could not be loaded", failed, ids.len());
        }
        Ok(())
    }

    async fn create_member(&self, member: NewMember) -> Result<()> {
        self.require_admin().await?;

        let password = rpassword::prompt_password("New member password: ")?;
        let form = MemberForm {
            fullname: member.fullname,
            role: member.role.unwrap_or(Role::Student),
            username: member.username,
            password,
            address: member.address.unwrap_or_default(),
            email: member.email.unwrap_or_default(),
            phone: member.phone.unwrap_or_default(),
            parent_email: member.parent_email.unwrap_or_default(),
            parent_phone: member.parent_phone.unwrap_or_default(),
            extra: member.extra.unwrap_or_default(),
            class_id: member.class_id,
        };
        let request = form.into_request()?;

        let user = self.pipeline.create_member(&request).await?;
        println!("Created {} #{} ({})", user.role.display_name(), user.id, user.username);
        Ok(())
    }

    async fn delete_member(&self, id: i64) -> Result<()> {
        self.require_admin().await?;
        self.pipeline.delete_member(id).await?;
        println!("Deleted member #{}", id);
        Ok(())
    }
}

/// Resolve the current role, sending the user to sign in when there is none
async fn resolve_session(pipeline: &AuthPipeline) -> Result<(Role, Option<User>)> {
    match RouteGuard::new(pipeline).check().await? {
        Access::Granted { role, user } => Ok((role, user)),
        Access::Denied => Err(anyhow!("Not signed in, run `skadi login`")),
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn print_member(user: &User) {
    println!("#{} {} ({})", user.id, user.display_name(), user.role.display_name());
    println!("  username: {}", user.username);
    if let Some(profile) = &user.profile {
        if let Some(contact) = &profile.contact {
            println!("  email:    {}", contact.email);
            println!("  phone:    {}", format_phone(&contact.phone));
        }
        if let Some(parent) = &profile.parent_contact {
            println!("  parent:   {} {}", parent.email, format_phone(&parent.phone));
        }
        if let Some(address) = &profile.address {
            println!("  address:  {}", address);
        }
        if let Some(extra) = &profile.extra {
            println!("  notes:    {}", extra);
        }
    }
    if let Some(class) = &user.class {
        println!("  class:    {}", class.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn test_hooks_sign_out_on_failure() {
        let store = CredentialStore::new();
        store.set("t".to_string(), Role::Teacher);
        let hooks = CliHooks {
            store: store.clone(),
            expired: AtomicBool::new(false),
        };

        hooks.on_auth_failure();
        assert!(!store.is_authenticated());
        assert!(hooks.expired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_hooks_refresh_keeps_role() {
        let store = CredentialStore::new();
        store.set("old".to_string(), Role::Admin);
        let hooks = CliHooks {
            store: store.clone(),
            expired: AtomicBool::new(false),
        };

        hooks.on_token_refresh(&store, "new".to_string());
        assert_eq!(store.token().as_deref(), Some("new"));
        assert_eq!(store.role(), Some(Role::Admin));
        assert!(!hooks.expired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_session_role_comes_from_identity() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user/me")
            .with_status(200)
            .with_body(r#"{"id": 2, "username": "petrova", "role": "teacher"}"#)
            .create_async()
            .await;

        let config = Config {
            api_base_url: server.url(),
            ..Default::default()
        };
        let store = CredentialStore::new();
        let pipeline = AuthPipeline::new(config, store.clone()).unwrap();
        pipeline
            .install_hooks(Arc::new(CliHooks {
                store: store.clone(),
                expired: AtomicBool::new(false),
            }))
            .unwrap();

        // Granted without any token in the store.
        let (role, user) = resolve_session(&pipeline).await.unwrap();
        assert_eq!(role, Role::Teacher);
        assert_eq!(user.unwrap().username, "petrova");
        assert_eq!(store.role(), None);
        assert!(tabs_for_role(role).is_empty());
    }

    #[tokio::test]
    async fn test_session_denied_when_refresh_fails() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/user/me").with_status(401).create_async().await;
        server
            .mock("POST", "/auth/private/obtain")
            .with_status(401)
            .create_async()
            .await;

        let config = Config {
            api_base_url: server.url(),
            ..Default::default()
        };
        let store = CredentialStore::new();
        let pipeline = AuthPipeline::new(config, store.clone()).unwrap();
        let hooks = Arc::new(CliHooks {
            store,
            expired: AtomicBool::new(false),
        });
        pipeline.install_hooks(hooks.clone()).unwrap();

        assert!(resolve_session(&pipeline).await.is_err());
        assert!(hooks.expired.load(Ordering::SeqCst));
    }
}

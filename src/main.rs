use chrono::{Local, Utc};
use serde_json::{json, Value};
use clap::{Args, Parser, Subcommand};
use shorts_uploader::accounts::AccountStore;
use shorts_uploader::auth::{AuthManager, ClientSecrets, TokenStore};
use shorts_uploader::config::{AppPaths, ConfigManager};
use shorts_uploader::error::{Result, UploaderError};
use shorts_uploader::logging::init_logging;
use shorts_uploader::metadata::MetadataGenerator;
use shorts_uploader::schedule::{
    import_folder, install_shutdown_handler, parse_schedule_time, ImportOptions, ScheduleRunner, ScheduleStore,
    ScheduledUpload, UploadHistory, UploadStatus,
};
use shorts_uploader::shorts::{shorts_url, Privacy};
use shorts_uploader::uploader::{UploadRequest, Uploader, YouTubePublisher};
use shorts_uploader::youtube_client::{VideoUpdate, YouTubeClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "shorts-uploader", version, about = "Upload videos as YouTube Shorts with AI-generated metadata")]
struct Cli {
    /// Config directory (default: ~/.youtube_shorts_uploader)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Account id or name (default: the current account)
    #[arg(long, short = 'a', global = true)]
    account: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in to YouTube and manage stored tokens
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Manage YouTube accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Upload a video as a Short
    Upload(UploadArgs),
    /// Generate metadata for a video without uploading it
    Metadata {
        path: PathBuf,
        /// Extra style instructions for the language model
        #[arg(long)]
        style: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage scheduled uploads
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// Inspect or edit uploaded videos
    #[command(subcommand)]
    Video(VideoCommand),
    /// Show the channel of the selected account
    Channel {
        /// Number of recent uploads to list
        #[arg(long, default_value_t = 5)]
        recent: u32,
    },
    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Authorize the selected account in the browser
    Login {
        /// OAuth client secrets JSON downloaded from the Google Cloud console
        #[arg(long)]
        client_secrets: Option<PathBuf>,
    },
    /// Show which accounts have usable tokens
    Status,
    /// Revoke and delete the selected account's token
    Logout,
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    List,
    Add { name: String },
    Remove { account: String },
    /// Make an account the current one
    Use { account: String },
    Rename { account: String, name: String },
}

#[derive(Args, Debug)]
struct UploadArgs {
    path: PathBuf,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,
    /// public, private or unlisted
    #[arg(long)]
    privacy: Option<String>,
    #[arg(long)]
    category: Option<String>,
    /// Don't notify subscribers
    #[arg(long)]
    no_notify: bool,
    #[arg(long)]
    made_for_kids: bool,
    /// Extra style instructions for generated metadata
    #[arg(long)]
    style: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    /// Schedule one video
    Add {
        path: PathBuf,
        /// When to upload, e.g. 2026-05-01T18:30 (local) or RFC 3339
        #[arg(long)]
        at: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long)]
        privacy: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Schedule every video in a folder at a fixed interval
    Import {
        folder: PathBuf,
        /// Hours between uploads
        #[arg(long, default_value_t = 24.0)]
        interval_hours: f64,
        /// First upload time (default: five minutes from now)
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        privacy: Option<String>,
        #[arg(long)]
        style: Option<String>,
    },
    /// List scheduled uploads
    List {
        /// Include cancelled, failed and errored entries
        #[arg(long)]
        all: bool,
    },
    Cancel { id: String },
    Remove { id: String },
    /// Put a failed or cancelled entry back in the queue
    Retry {
        id: String,
        /// New upload time
        #[arg(long)]
        at: Option<String>,
    },
    /// Show completed scheduled uploads
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Process due uploads now, or keep polling
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand, Debug)]
enum VideoCommand {
    /// Processing and privacy status of an uploaded video
    Status { video_id: String },
    /// Change metadata of an uploaded video
    Update {
        video_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long)]
        privacy: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Get { key: String },
    /// Set a value; nested keys use dots (api_keys.openai)
    Set { key: String, value: String },
    Reset,
    /// Store an API key read from the terminal without echo
    SetApiKey {
        /// openai or anthropic
        provider: String,
    },
}

struct Context {
    paths: AppPaths,
    config: ConfigManager,
    account: Option<String>,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let paths = AppPaths::resolve(cli.config_dir.as_deref());
        paths.ensure()?;
        let config = ConfigManager::open(&paths)?;
        Ok(Self {
            paths,
            config,
            account: cli.account.clone(),
        })
    }

    fn accounts(&self) -> Result<AccountStore> {
        AccountStore::load(self.paths.accounts_file())
    }

    /// Id of the selected account.
    fn account_id(&self) -> Result<String> {
        let accounts = self.accounts()?;
        Ok(accounts.resolve_or_current(self.account.as_deref())?.id.clone())
    }

    fn tokens(&self) -> TokenStore {
        self.paths.token_store(self.config.settings())
    }

    fn auth(&self, account_id: &str) -> AuthManager {
        AuthManager::new(YouTubeClient::new(), self.tokens(), account_id)
    }

    async fn access_token(&self) -> Result<String> {
        self.auth(&self.account_id()?).access_token().await
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging("shorts-uploader") {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut ctx = Context::load(&cli)?;

    match cli.command {
        Command::Auth(cmd) => auth_command(&ctx, cmd).await,
        Command::Accounts(cmd) => accounts_command(&ctx, cmd),
        Command::Upload(args) => upload_command(&ctx, args).await,
        Command::Metadata { path, style, json } => metadata_command(&ctx, &path, style, json).await,
        Command::Schedule(cmd) => schedule_command(&ctx, cmd).await,
        Command::Video(cmd) => video_command(&ctx, cmd).await,
        Command::Channel { recent } => channel_command(&ctx, recent).await,
        Command::Config(cmd) => config_command(&mut ctx, cmd),
    }
}

fn parse_privacy(raw: Option<&str>, default: &str) -> Result<Privacy> {
    raw.unwrap_or(default).parse()
}

async fn auth_command(ctx: &Context, cmd: AuthCommand) -> Result<()> {
    match cmd {
        AuthCommand::Login { client_secrets } => {
            let mut accounts = ctx.accounts()?;
            if accounts.list().is_empty() && ctx.account.is_none() {
                accounts.add("Default")?;
            }
            let account = accounts.resolve_or_current(ctx.account.as_deref())?.clone();

            let secrets_path = ctx.paths.client_secrets_file(&account.id);
            let secrets = match client_secrets {
                Some(path) => {
                    let secrets = ClientSecrets::from_file(&path)?;
                    secrets.save(&secrets_path)?;
                    secrets
                }
                None => ClientSecrets::from_file(&secrets_path).map_err(|e| match e {
                    UploaderError::NotFound(_) => UploaderError::Auth(format!(
                        "No client secrets for account '{}'. Pass --client-secrets <file>",
                        account.name
                    )),
                    other => other,
                })?,
            };

            let token = ctx.auth(&account.id).authorize(&secrets).await?;
            match YouTubeClient::new().get_channel_info(&token.token).await {
                Ok(channel) => {
                    accounts.mark_authenticated(&account.id, Some(&channel))?;
                    println!("✅ Signed in '{}' to channel {}", account.name, channel.title);
                }
                Err(e) => {
                    tracing::warn!("Signed in, but could not fetch channel info: {}", e);
                    accounts.mark_authenticated(&account.id, None)?;
                    println!("✅ Signed in '{}'", account.name);
                }
            }
            Ok(())
        }
        AuthCommand::Status => {
            let accounts = ctx.accounts()?;
            if accounts.list().is_empty() {
                println!("No accounts. Run `shorts-uploader auth login --client-secrets <file>`");
                return Ok(());
            }
            let current = accounts.current().map(|a| a.id.clone());
            for account in accounts.list() {
                let marker = if current.as_deref() == Some(account.id.as_str()) { "*" } else { " " };
                let state = if ctx.auth(&account.id).is_authenticated() {
                    "authenticated"
                } else {
                    "not authenticated"
                };
                println!(
                    "{} {} ({}) - {}{}",
                    marker,
                    account.name,
                    account.id,
                    state,
                    account
                        .channel_title
                        .as_deref()
                        .map(|t| format!(", channel: {}", t))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        AuthCommand::Logout => {
            let mut accounts = ctx.accounts()?;
            let account = accounts.resolve_or_current(ctx.account.as_deref())?.clone();
            let removed = ctx.auth(&account.id).revoke().await?;
            accounts.mark_signed_out(&account.id)?;
            if removed {
                println!("Signed out '{}'", account.name);
            } else {
                println!("'{}' was not signed in", account.name);
            }
            Ok(())
        }
    }
}

fn accounts_command(ctx: &Context, cmd: AccountsCommand) -> Result<()> {
    let mut accounts = ctx.accounts()?;
    match cmd {
        AccountsCommand::List => {
            let current = accounts.current().map(|a| a.id.clone());
            for account in accounts.list() {
                let marker = if current.as_deref() == Some(account.id.as_str()) { "*" } else { " " };
                println!(
                    "{} {:<20} {}  {}",
                    marker,
                    account.name,
                    account.id,
                    if account.authenticated { "signed in" } else { "signed out" }
                );
            }
        }
        AccountsCommand::Add { name } => {
            let account = accounts.add(&name)?;
            println!("Added account '{}' ({})", account.name, account.id);
        }
        AccountsCommand::Remove { account } => {
            let id = accounts.resolve(&account)?.id.clone();
            let removed = accounts.remove(&id)?;
            // Token and client secrets belong to the account
            if let Err(e) = ctx.tokens().delete(&id) {
                tracing::warn!("Could not delete token for {}: {}", id, e);
            }
            let secrets = ctx.paths.client_secrets_file(&id);
            if secrets.exists() {
                if let Err(e) = std::fs::remove_file(&secrets) {
                    tracing::warn!("Could not delete {}: {}", secrets.display(), e);
                }
            }
            println!("Removed account '{}'", removed.name);
        }
        AccountsCommand::Use { account } => {
            let id = accounts.resolve(&account)?.id.clone();
            accounts.set_current(&id)?;
            println!("Current account: {}", account);
        }
        AccountsCommand::Rename { account, name } => {
            let id = accounts.resolve(&account)?.id.clone();
            accounts.rename(&id, &name)?;
            println!("Renamed account {} to '{}'", id, name.trim());
        }
    }
    Ok(())
}

async fn upload_command(ctx: &Context, args: UploadArgs) -> Result<()> {
    let settings = ctx.config.settings();
    let account_id = ctx.account_id()?;

    let mut request = UploadRequest::from_settings(&account_id, &args.path, settings)?;
    request.title = args.title;
    request.description = args.description;
    request.tags = args.tags;
    request.privacy = parse_privacy(args.privacy.as_deref(), &settings.privacy_status)?;
    if let Some(category) = args.category {
        request.category_id = category;
    }
    if args.no_notify {
        request.notify_subscribers = false;
    }
    if args.made_for_kids {
        request.made_for_kids = true;
    }
    if args.style.is_some() {
        request.style_prompt = args.style;
    }

    let publisher = YouTubePublisher::new(YouTubeClient::new(), ctx.tokens());
    let uploader = Uploader::from_settings(Arc::new(publisher), settings);
    let outcome = uploader.upload(&request).await?;

    println!("✅ Uploaded: {}", outcome.url);
    println!("Title: {}", outcome.title);
    if outcome.deleted_local_file {
        println!("Deleted local file {}", args.path.display());
    }
    Ok(())
}

async fn metadata_command(ctx: &Context, path: &Path, style: Option<String>, json: bool) -> Result<()> {
    let settings = ctx.config.settings();
    let generator = MetadataGenerator::from_settings(settings);
    if !generator.has_model() {
        tracing::warn!("No language model API key configured, using fallback metadata");
    }

    let style = style.or_else(|| Some(settings.style_prompt.clone()).filter(|s| !s.trim().is_empty()));
    let metadata = generator.generate(path, style.as_deref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Title: {}", metadata.title);
    println!("Description: {}", metadata.description);
    println!("Hashtags: {}", metadata.hashtags.join(" "));
    if let Some(probe) = &metadata.probe {
        let (width, height) = probe.display_dimensions();
        println!(
            "Video: {}x{}, {:.1}s, {:.0} fps{}",
            width,
            height,
            probe.duration_seconds,
            probe.fps,
            if probe.is_short_form() { "" } else { " (not Shorts-eligible)" }
        );
    }
    for (i, alternative) in metadata.alternatives.iter().enumerate() {
        println!("\nAlternative {}: {}", i + 1, alternative.title);
        if !alternative.description.is_empty() {
            println!("  {}", alternative.description);
        }
    }
    Ok(())
}

async fn schedule_command(ctx: &Context, cmd: ScheduleCommand) -> Result<()> {
    let settings = ctx.config.settings();
    let schedule_file = ctx.paths.schedule_file();

    match cmd {
        ScheduleCommand::Add {
            path,
            at,
            title,
            description,
            tags,
            privacy,
            category,
        } => {
            if !path.is_file() {
                return Err(UploaderError::NotFound(format!("Video file {}", path.display())));
            }
            let path = std::fs::canonicalize(&path)?;
            let account_id = Some(ctx.account_id()?);

            let mut entry = ScheduledUpload::new(path, account_id, parse_schedule_time(&at)?);
            entry.title = title.unwrap_or_default();
            entry.description = description.unwrap_or_default();
            entry.tags = tags.unwrap_or_default();
            entry.privacy = parse_privacy(privacy.as_deref(), &settings.privacy_status)?;
            entry.category_id = category;

            let mut store = ScheduleStore::load(&schedule_file)?;
            let id = store.add(entry).id.clone();
            store.save()?;
            println!("Scheduled {}", id);
        }
        ScheduleCommand::Import {
            folder,
            interval_hours,
            start,
            privacy,
            style,
        } => {
            let options = ImportOptions {
                account_id: Some(ctx.account_id()?),
                interval_hours,
                start: start.as_deref().map(parse_schedule_time).transpose()?,
                privacy: parse_privacy(privacy.as_deref(), &settings.privacy_status)?,
                extensions: settings.video_extensions.clone(),
                style_prompt: style.or_else(|| Some(settings.style_prompt.clone()).filter(|s| !s.trim().is_empty())),
            };
            let generator = MetadataGenerator::from_settings(settings);

            let mut store = ScheduleStore::load(&schedule_file)?;
            let scheduled = import_folder(&mut store, &folder, &options, &generator).await?;
            store.save()?;

            for entry in &scheduled {
                println!("{}  {}", local_time(&entry.scheduled_time), entry.display_title());
            }
            println!("Scheduled {} videos", scheduled.len());
        }
        ScheduleCommand::List { all } => {
            let store = ScheduleStore::load(&schedule_file)?;
            let mut entries: Vec<&ScheduledUpload> = store
                .list()
                .iter()
                .filter(|e| all || e.status == UploadStatus::Pending)
                .collect();
            entries.sort_by_key(|e| e.scheduled_time);

            if entries.is_empty() {
                println!("No scheduled uploads");
            }
            for entry in entries {
                println!(
                    "{}  {}  {:<9}  {}{}",
                    &entry.id[..8.min(entry.id.len())],
                    local_time(&entry.scheduled_time),
                    entry.status,
                    entry.display_title(),
                    entry
                        .last_error
                        .as_deref()
                        .map(|e| format!("  [{}]", e))
                        .unwrap_or_default()
                );
            }
        }
        ScheduleCommand::Cancel { id } => {
            let mut store = ScheduleStore::load(&schedule_file)?;
            let title = store.cancel(&id)?.display_title();
            store.save()?;
            println!("Cancelled {}", title);
        }
        ScheduleCommand::Remove { id } => {
            let mut store = ScheduleStore::load(&schedule_file)?;
            let removed = store.remove(&id)?;
            store.save()?;
            println!("Removed {}", removed.display_title());
        }
        ScheduleCommand::Retry { id, at } => {
            let at = at.as_deref().map(parse_schedule_time).transpose()?;
            let mut store = ScheduleStore::load(&schedule_file)?;
            let entry = store.retry(&id, at)?;
            println!("{} queued for {}", entry.display_title(), local_time(&entry.scheduled_time));
            store.save()?;
        }
        ScheduleCommand::History { limit } => {
            let entries = UploadHistory::new(ctx.paths.history_file()).entries()?;
            if entries.is_empty() {
                println!("No completed scheduled uploads");
            }
            for entry in entries.iter().rev().take(limit) {
                let uploaded = entry.uploaded_at.as_ref().map(local_time).unwrap_or_default();
                let url = entry.video_id.as_deref().map(shorts_url).unwrap_or_default();
                println!("{}  {}  {}", uploaded, entry.display_title(), url);
            }
        }
        ScheduleCommand::Run { once } => {
            let runner = ScheduleRunner::from_settings(&ctx.paths, settings);
            if once {
                let summary = runner.process_due(Utc::now()).await?;
                println!(
                    "{} due: {} completed, {} will retry, {} failed",
                    summary.due, summary.completed, summary.retrying, summary.failed
                );
            } else {
                let interval = Duration::from_secs(settings.check_interval_secs.max(1));
                runner.run_service(interval, install_shutdown_handler()?).await?;
            }
        }
    }
    Ok(())
}

async fn video_command(ctx: &Context, cmd: VideoCommand) -> Result<()> {
    let client = YouTubeClient::new();
    let token = ctx.access_token().await?;

    match cmd {
        VideoCommand::Status { video_id } => {
            let status = client.get_upload_status(&token, &video_id).await?;
            println!("Video: {}", shorts_url(&status.video_id));
            println!("Upload status: {}", status.upload_status);
            println!("Processing: {}", status.processing_status);
            println!("Privacy: {}", status.privacy_status);
            if let Some(reason) = status.failure_reason.or(status.rejection_reason) {
                println!("Reason: {}", reason);
            }
        }
        VideoCommand::Update {
            video_id,
            title,
            description,
            tags,
            privacy,
            category,
        } => {
            let update = VideoUpdate {
                title,
                description,
                tags,
                category_id: category,
                privacy: privacy.as_deref().map(str::parse).transpose()?,
            };
            if update.is_empty() {
                return Err(UploaderError::Config("Nothing to update".to_string()));
            }
            client.update_video_metadata(&token, &video_id, &update).await?;
            println!("✅ Updated {}", video_id);
        }
    }
    Ok(())
}

async fn channel_command(ctx: &Context, recent: u32) -> Result<()> {
    let client = YouTubeClient::new();
    let token = ctx.access_token().await?;

    let channel = client.get_channel_info(&token).await?;
    println!("Channel: {} ({})", channel.title, channel.id);
    if let Some(url) = &channel.custom_url {
        println!("URL: https://youtube.com/{}", url);
    }
    if let Some(subscribers) = channel.subscriber_count {
        println!("Subscribers: {}", subscribers);
    }
    if let Some(videos) = channel.video_count {
        println!("Videos: {}", videos);
    }

    if recent > 0 {
        let uploads = client.list_recent_uploads(&token, recent).await?;
        if !uploads.is_empty() {
            println!("\nRecent uploads:");
        }
        for upload in uploads {
            println!(
                "  {}  {}  {}",
                upload.published_at.as_deref().unwrap_or("-"),
                upload.title,
                shorts_url(&upload.video_id)
            );
        }
    }
    Ok(())
}

fn config_command(ctx: &mut Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let value = mask_secrets("", serde_json::to_value(ctx.config.settings())?);
            println!("{}", serde_json::to_string_pretty(&value)?);
            println!("\nConfig file: {}", ctx.config.path().display());
        }
        ConfigCommand::Get { key } => {
            println!("{}", mask_secrets(&key, ctx.config.get(&key)?));
        }
        ConfigCommand::Set { key, value } => {
            ctx.config.set(&key, &value)?;
            println!("{} = {}", key, mask_secrets(&key, ctx.config.get(&key)?));
        }
        ConfigCommand::Reset => {
            ctx.config.reset()?;
            println!("Settings reset to defaults");
        }
        ConfigCommand::SetApiKey { provider } => {
            let provider = provider.trim().to_lowercase();
            if provider != "openai" && provider != "anthropic" {
                return Err(UploaderError::Config(format!(
                    "Unknown provider '{}'. Use 'openai' or 'anthropic'",
                    provider
                )));
            }
            let key = rpassword::prompt_password(format!("{} API key: ", provider))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(UploaderError::Config("API key cannot be empty".to_string()));
            }
            let json_value = serde_json::to_string(key)?;
            ctx.config.set(&format!("api_keys.{}", provider), &json_value)?;
            println!("✅ Saved {} API key", provider);
        }
    }
    Ok(())
}

/// Stored API keys under `key` replaced by asterisks for display.
fn mask_secrets(key: &str, value: Value) -> Value {
    match value {
        Value::String(secret) if key.starts_with("api_keys.") && !secret.is_empty() => json!("********"),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, child)| {
                    let path = if key.is_empty() { name.clone() } else { format!("{}.{}", key, name) };
                    (name, mask_secrets(&path, child))
                })
                .collect(),
        ),
        other => other,
    }
}

fn local_time(time: &chrono::DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorts_uploader::auth::StoredToken;

    /// Config directory that keeps secrets in files, away from the real keychain.
    fn config_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), r#"{"use_keychain": false}"#).unwrap();
        dir
    }

    fn cli(dir: &Path, args: &[&str]) -> Cli {
        let mut argv = vec![
            "shorts-uploader".to_string(),
            "--config-dir".to_string(),
            dir.display().to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        Cli::try_parse_from(argv).unwrap()
    }

    fn current_account(paths: &AppPaths) -> String {
        AccountStore::load(paths.accounts_file()).unwrap().current().unwrap().id.clone()
    }

    #[tokio::test]
    async fn test_accounts_remove_deletes_token_and_client_secrets() {
        let dir = config_dir();
        let paths = AppPaths::resolve(Some(dir.path()));
        run(cli(dir.path(), &["accounts", "add", "Main"])).await.unwrap();
        let id = current_account(&paths);

        let token = StoredToken {
            token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: Vec::new(),
            expiry: None,
        };
        TokenStore::new(paths.tokens_dir()).save(&id, &token).unwrap();
        std::fs::write(paths.client_secrets_file(&id), "{}").unwrap();

        run(cli(dir.path(), &["accounts", "remove", "main"])).await.unwrap();

        assert!(!paths.token_file(&id).exists());
        assert!(!paths.client_secrets_file(&id).exists());
        assert!(AccountStore::load(paths.accounts_file()).unwrap().list().is_empty());
    }

    #[tokio::test]
    async fn test_accounts_rename_rejects_blank_name() {
        let dir = config_dir();
        run(cli(dir.path(), &["accounts", "add", "Main"])).await.unwrap();

        let result = run(cli(dir.path(), &["accounts", "rename", "Main", " "])).await;
        assert!(matches!(result, Err(UploaderError::Config(_))));
    }

    #[tokio::test]
    async fn test_config_set_coerces_values_and_keeps_keys_out_of_config_file() {
        let dir = config_dir();
        let paths = AppPaths::resolve(Some(dir.path()));

        run(cli(dir.path(), &["config", "set", "category_id", "25"])).await.unwrap();
        run(cli(dir.path(), &["config", "set", "max_upload_attempts", "5"])).await.unwrap();
        run(cli(dir.path(), &["config", "set", "api_keys.openai", "sk-secret"])).await.unwrap();

        let raw = std::fs::read_to_string(paths.config_file()).unwrap();
        let on_disk: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk["category_id"], "25");
        assert_eq!(on_disk["max_upload_attempts"], 5);
        assert!(!raw.contains("sk-secret"));

        let config = ConfigManager::open(&paths).unwrap();
        assert_eq!(config.settings().api_keys.openai, "sk-secret");
    }

    #[tokio::test]
    async fn test_config_set_rejects_unknown_privacy() {
        let dir = config_dir();
        let result = run(cli(dir.path(), &["config", "set", "privacy_status", "secret"])).await;
        assert!(matches!(result, Err(UploaderError::Config(_))));

        let paths = AppPaths::resolve(Some(dir.path()));
        assert_eq!(ConfigManager::open(&paths).unwrap().settings().privacy_status, "public");
    }

    #[test]
    fn test_mask_secrets_hides_api_keys_only() {
        let settings = json!({"category_id": "22", "api_keys": {"openai": "sk-1", "anthropic": ""}});
        let masked = mask_secrets("", settings);
        assert_eq!(masked["api_keys"]["openai"], "********");
        assert_eq!(masked["api_keys"]["anthropic"], "");
        assert_eq!(masked["category_id"], "22");

        assert_eq!(mask_secrets("api_keys.openai", json!("sk-1")), json!("********"));
        assert_eq!(mask_secrets("api_keys", json!({"openai": "sk-1"}))["openai"], "********");
        assert_eq!(mask_secrets("style_prompt", json!("sk-1")), json!("sk-1"));
    }

    #[tokio::test]
    async fn test_schedule_import_rejects_infinite_interval() {
        let dir = config_dir();
        let paths = AppPaths::resolve(Some(dir.path()));
        let videos = tempfile::tempdir().unwrap();
        std::fs::write(videos.path().join("a.mp4"), b"x").unwrap();
        run(cli(dir.path(), &["accounts", "add", "Main"])).await.unwrap();

        let folder = videos.path().display().to_string();
        let result = run(cli(dir.path(), &["schedule", "import", &folder, "--interval-hours", "inf"])).await;

        assert!(matches!(result, Err(UploaderError::Schedule(_))));
        assert!(ScheduleStore::load(paths.schedule_file()).unwrap().list().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_add_then_cancel_by_prefix() {
        let dir = config_dir();
        let paths = AppPaths::resolve(Some(dir.path()));
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"x").unwrap();
        run(cli(dir.path(), &["accounts", "add", "Main"])).await.unwrap();

        let video = video.display().to_string();
        run(cli(dir.path(), &["schedule", "add", &video, "--at", "2030-01-01T10:00", "--title", "Later"]))
            .await
            .unwrap();

        let entry = ScheduleStore::load(paths.schedule_file()).unwrap().list()[0].clone();
        assert_eq!(entry.title, "Later");
        assert_eq!(entry.account_id, Some(current_account(&paths)));

        run(cli(dir.path(), &["schedule", "cancel", &entry.id[..8]])).await.unwrap();
        let stored = ScheduleStore::load(paths.schedule_file()).unwrap();
        assert_eq!(stored.find(&entry.id).unwrap().status, UploadStatus::Cancelled);
    }
}

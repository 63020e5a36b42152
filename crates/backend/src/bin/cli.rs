use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Duration, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use cookie::Cookie;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use shared_types::{
    LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UpdateProfileRequest,
    UserProfile,
};
use vista_auth::{
    auth::{TokenCodec, TokenKind},
    config::{JwtConfig, REFRESH_COOKIE_SUFFIX},
};

#[derive(Parser)]
#[command(name = "vista-authctl")]
#[command(about = "CLI for the vista-auth service")]
#[command(
    long_about = "A command-line client for the vista-auth HTTP API.\n\n\
    Logs in with email and password and keeps the session cookies in a local file,\n\
    so later commands act as the logged-in user. Can also issue and inspect tokens\n\
    offline given the signing secret."
)]
struct Cli {
    /// Auth server URL to connect to.
    #[arg(
        short,
        long,
        default_value = "http://localhost:8080",
        env = "VISTA_AUTH_URL"
    )]
    base_url: String,

    /// File holding the session cookies between invocations.
    #[arg(
        long,
        default_value = ".vista-authctl-session.json",
        env = "VISTA_AUTH_SESSION"
    )]
    session_file: PathBuf,

    /// Base name of the auth cookies; must match the server's JWT_COOKIE_NAME.
    #[arg(long, default_value = "vista_token", env = "JWT_COOKIE_NAME")]
    cookie_name: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a password account. A verification link is sent by mail.
    Register {
        username: String,
        email: String,
        #[arg(long, env = "VISTA_AUTH_PASSWORD")]
        password: String,
    },
    /// Verify an email address with the token from the verification link
    Verify { token: String },
    /// Ask for a fresh verification link
    ResendVerification { email: String },
    /// Log in and store the session cookies
    Login {
        email: String,
        #[arg(long, env = "VISTA_AUTH_PASSWORD")]
        password: String,
    },
    /// Show the logged-in user
    Whoami,
    /// Exchange the refresh cookie for a new access cookie
    Refresh,
    /// Clear the session on the server response and locally
    Logout,
    /// Change display name or picture
    UpdateProfile {
        #[arg(short, long)]
        name: Option<String>,
        /// Pass an empty string to remove the picture.
        #[arg(short, long, value_name = "URL")]
        picture_url: Option<String>,
    },
    /// Permanently delete the logged-in account
    DeleteAccount,
    /// Offline token tools
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Sign a token for `subject`
    Issue {
        subject: String,
        #[arg(short, long, value_enum, default_value_t = KindArg::Access)]
        kind: KindArg,
        /// Lifetime in seconds; defaults to the server defaults per kind.
        #[arg(long)]
        ttl_secs: Option<i64>,
        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Verify a token and print its claims
    Inspect {
        token: String,
        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        secret: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Access,
    Refresh,
}

impl From<KindArg> for TokenKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Access => TokenKind::Access,
            KindArg::Refresh => TokenKind::Refresh,
        }
    }
}

/// Cookie values kept between invocations.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionCookies {
    access: Option<String>,
    refresh: Option<String>,
}

impl SessionCookies {
    fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).context("Failed to read session file")?;
        serde_json::from_str(&content).context("Failed to parse session file")
    }

    fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).context("Failed to write session file")
    }

    /// Apply the `Set-Cookie` headers of a response. An empty value clears.
    fn absorb(&mut self, response: &Response, cookie_name: &str) {
        let refresh_name = format!("{}{}", cookie_name, REFRESH_COOKIE_SUFFIX);
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let Ok(cookie) = Cookie::parse(raw.to_string()) else {
                continue;
            };
            let slot = if cookie.name() == cookie_name {
                &mut self.access
            } else if cookie.name() == refresh_name {
                &mut self.refresh
            } else {
                continue;
            };
            *slot = Some(cookie.value().to_string()).filter(|v| !v.is_empty());
        }
    }

    fn header(&self, cookie_name: &str) -> Option<String> {
        let mut pairs = Vec::new();
        if let Some(access) = &self.access {
            pairs.push(format!("{}={}", cookie_name, access));
        }
        if let Some(refresh) = &self.refresh {
            pairs.push(format!("{}{}={}", cookie_name, REFRESH_COOKIE_SUFFIX, refresh));
        }
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(response: Response) -> anyhow::Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => "no error message".to_string(),
    };
    bail!("{}: {}", status, message)
}

struct Api {
    client: Client,
    base_url: String,
    cookie_name: String,
    session_file: PathBuf,
    session: SessionCookies,
}

impl Api {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn with_cookies(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.header(&self.cookie_name) {
            Some(cookies) => request.header(header::COOKIE, cookies),
            None => request,
        }
    }

    async fn send(&mut self, request: reqwest::RequestBuilder) -> anyhow::Result<Response> {
        let response = self
            .with_cookies(request)
            .send()
            .await
            .context("Request to auth server failed")?;
        self.session.absorb(&response, &self.cookie_name);
        self.session.save(&self.session_file)?;
        check(response).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut api = Api {
        client: Client::new(),
        session: SessionCookies::load(&cli.session_file)?,
        base_url: cli.base_url,
        cookie_name: cli.cookie_name,
        session_file: cli.session_file,
    };

    match cli.command {
        Commands::Register {
            username,
            email,
            password,
        } => {
            let req = RegisterRequest {
                username,
                email_address: email,
                verify_password: password.clone(),
                password,
            };
            let request = api.client.post(api.url("/api/auth/register")).json(&req);
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::Verify { token } => {
            let request = api
                .client
                .get(api.url("/api/auth/verify"))
                .query(&[("token", token)]);
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::ResendVerification { email } => {
            let request = api
                .client
                .post(api.url("/api/auth/resend-verification"))
                .query(&[("emailAddress", email)]);
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::Login { email, password } => {
            let req = LoginRequest {
                email_address: email,
                password,
            };
            let request = api.client.post(api.url("/api/auth/login")).json(&req);
            let body: LoginResponse = api.send(request).await?.json().await?;
            println!("{} as {}", body.message, body.user.email_address);
            print_profile(&body.user);
        }
        Commands::Whoami => {
            let request = api.client.get(api.url("/api/auth/user"));
            let profile: UserProfile = api.send(request).await?.json().await?;
            print_profile(&profile);
        }
        Commands::Refresh => {
            let request = api.client.post(api.url("/api/auth/refresh"));
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::Logout => {
            let request = api.client.post(api.url("/api/auth/logout"));
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::UpdateProfile { name, picture_url } => {
            let req = UpdateProfileRequest { name, picture_url };
            let request = api.client.put(api.url("/api/auth/update-profile")).json(&req);
            let profile: UserProfile = api.send(request).await?.json().await?;
            print_profile(&profile);
        }
        Commands::DeleteAccount => {
            let request = api.client.post(api.url("/api/auth/delete"));
            let body: MessageResponse = api.send(request).await?.json().await?;
            println!("{}", body.message);
        }
        Commands::Token { action } => handle_token(action)?,
    }

    Ok(())
}

fn handle_token(action: TokenAction) -> anyhow::Result<()> {
    match action {
        TokenAction::Issue {
            subject,
            kind,
            ttl_secs,
            secret,
        } => {
            let codec = TokenCodec::new(&jwt_config(secret));
            let kind = TokenKind::from(kind);
            let ttl = ttl_secs.map(Duration::seconds).unwrap_or_else(|| codec.ttl(kind));
            let token = codec.issue(&subject, kind, ttl)?;
            println!("{}", token);
        }
        TokenAction::Inspect { token, secret } => {
            let codec = TokenCodec::new(&jwt_config(secret));
            let claims = codec.verify(&token).context("Token rejected")?;
            println!("subject:    {}", claims.sub);
            println!("type:       {}", claims.kind.as_str());
            println!("issued at:  {}", format_timestamp(claims.iat));
            println!("expires at: {}", format_timestamp(claims.exp));
        }
    }
    Ok(())
}

fn jwt_config(secret: String) -> JwtConfig {
    JwtConfig {
        secret,
        access_token_ttl: Duration::seconds(900),
        refresh_token_ttl: Duration::seconds(604_800),
    }
}

fn format_timestamp(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

fn print_profile(profile: &UserProfile) {
    println!("[{}] {} <{}>", &profile.id.to_string()[..8], profile.name, profile.email_address);
    println!("    provider: {}", profile.provider);
    if let Some(picture) = &profile.picture_url {
        println!("    picture:  {}", picture);
    }
}

use clap::{
    crate_authors,
    crate_description,
    crate_name,
    crate_version,
    Args,
    Parser,
};

pub mod server;

#[derive(Parser, Debug)]
#[command(name = crate_name!())]
#[command(author = crate_authors!())]
#[command(about = crate_description!())]
#[command(version = crate_version!())]
pub enum Options {
    /// Run the auction server.
    Run(RunOptions),
}

#[derive(Args, Clone, Debug)]
pub struct RunOptions {
    /// Server Options
    #[command(flatten)]
    pub server: server::Options,

    #[command(flatten)]
    pub auth: AuthOptions,

    #[command(flatten)]
    pub lock: LockOptions,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Auth Options")]
#[group(id = "Auth")]
pub struct AuthOptions {
    /// Symmetric key used to sign access tokens. Must be at least 32 characters.
    #[arg(long = "jwt-secret-key")]
    #[arg(env = "JWT_SECRET_KEY")]
    pub jwt_secret_key: String,
    /// Issuer claim stamped into and required from access tokens.
    #[arg(long = "jwt-issuer")]
    #[arg(env = "JWT_ISSUER")]
    #[arg(default_value = "gavel-server")]
    pub jwt_issuer:     String,
    /// Audience claim stamped into and required from access tokens.
    #[arg(long = "jwt-audience")]
    #[arg(env = "JWT_AUDIENCE")]
    #[arg(default_value = "gavel-clients")]
    pub jwt_audience:   String,
}

#[derive(Args, Clone, Debug)]
#[command(next_help_heading = "Lock Options")]
#[group(id = "Lock")]
pub struct LockOptions {
    /// Redis endpoint backing the per-auction distributed lock.
    #[arg(long = "redis-url")]
    #[arg(env = "REDIS_URL")]
    #[arg(default_value = "redis://127.0.0.1:6379")]
    pub redis_url:                String,
    /// When disabled the server falls back to an in-process lock with the
    /// same contract, which is only safe for a single instance.
    #[arg(long = "distributed-lock-enabled")]
    #[arg(env = "DISTRIBUTED_LOCK_ENABLED")]
    #[arg(default_value = "true")]
    #[arg(action = clap::ArgAction::Set)]
    pub distributed_lock_enabled: bool,
}

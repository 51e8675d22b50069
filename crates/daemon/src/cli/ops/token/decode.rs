use clap::Args;

use common::access::key_hash;
use common::token::{JoinToken, TokenError};

#[derive(Args, Debug, Clone)]
pub struct Decode {
    /// Raw token text
    #[arg(env = "KEEL_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Print the password instead of masking it
    #[arg(long)]
    pub show_password: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Decode {
    type Error = TokenError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let token = JoinToken::decode(&self.token)?;

        let password = if self.show_password {
            token.password.clone()
        } else {
            "*".repeat(token.password.chars().count())
        };

        Ok(format!(
            "ca hash:  {}\nusername: {}\npassword: {}\nstamp:    joined-{}",
            if token.is_pinned() {
                token.ca_hash.as_str()
            } else {
                "(unpinned)"
            },
            if token.username.is_empty() {
                "(none)"
            } else {
                token.username.as_str()
            },
            password,
            key_hash(&self.token),
        ))
    }
}

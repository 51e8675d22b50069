use clap::{Args, Subcommand};

pub mod decode;
pub mod encode;

use crate::cli::op::Op;

crate::command_enum! {
    (Decode, decode::Decode),
    (Encode, encode::Encode),
}

pub type TokenCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Token {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[async_trait::async_trait]
impl Op for Token {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

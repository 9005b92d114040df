extern crate tables;

mod callbacks;
mod commands;
#[macro_use]
mod common;
mod config;
mod conversation;
mod dialogues;
mod engine;
mod entries;
mod ledger;
mod marketplace;
mod notify;
mod utils;
mod vendor;
mod warehouse;

#[cfg(test)]
mod testing;

use std::fmt::Display;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::{error::Error as StdError, fs::File};

use config::Config;
use futures::future::BoxFuture;
use log::{debug, info};
use teloxide::error_handlers::ErrorHandler;
use tokio_util::sync::CancellationToken;

use teloxide::{
    dispatching::{DpHandlerDescription, UpdateHandler},
    prelude::*,
};

use common::Operators;
use engine::Engine;
use marketplace::{gateway::Gateway, Links, SharedMarket};
use notify::TelegramNotifier;

mod prelude {
    pub use super::{HandlerResult, Result, UnkError};
    pub use crate::common::*;
    pub use crate::dialogues::prelude::*;
    pub use crate::entries::prelude::*;
    pub use crate::warehouse::prelude::*;
}

pub type BoxedError = Box<dyn StdError + Send + Sync>;
pub type Result<T> = std::result::Result<T, BoxedError>;
pub type HandlerResult = Handler<'static, DependencyMap, Result<()>, DpHandlerDescription>;

const PLAIN_CONFIG: &str = "config.toml";
const ENCRYPTED_CONFIG: &str = "config.toml.enc";

#[derive(Debug)]
pub enum UnkError {
    Unknown(String),
    Dialogue(String),
    Conversation(String),
}

impl UnkError {
    pub fn unknown(s: &str) -> Self {
        Self::Unknown(s.to_owned())
    }

    pub fn dialogue(s: &str) -> Self {
        Self::Dialogue(s.to_owned())
    }

    pub fn conversation(s: &str) -> Self {
        Self::Conversation(s.to_owned())
    }
}

impl Display for UnkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnkError::Unknown(s) => write!(f, "invalid request: {}", s),
            UnkError::Dialogue(s) => write!(f, "dialogue error: {}", s),
            UnkError::Conversation(s) => write!(f, "conversation error: {}", s),
        }
    }
}

impl StdError for UnkError {}

struct DisplayErrorHandler;

impl<E> ErrorHandler<E> for DisplayErrorHandler
where
    E: Display,
{
    fn handle_error(self: Arc<Self>, error: E) -> BoxFuture<'static, ()> {
        log::error!("An error occurred: {}", error);
        Box::pin(async {})
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let config = read_config();

    let warehouse = self::warehouse::build(&config.storage.dir)
        .await
        .expect("Can't open storage");
    let vendor = vendor::build(&config.vendor, warehouse.clone()).expect("Can't build vendor");
    let market: SharedMarket =
        Arc::new(Gateway::new(&config.marketplace).expect("Can't build marketplace gateway"));

    let bot = Bot::new(&config.telegram.bot_token);
    let links = Links {
        order_url: config.marketplace.order_url.clone(),
        user_url: config.marketplace.user_url.clone(),
    };
    let notifier = Arc::new(TelegramNotifier::new(
        bot.clone(),
        warehouse.clone(),
        links.clone(),
    ));

    let engine = Arc::new(Engine::new(
        market.clone(),
        vendor.clone(),
        notifier,
        warehouse.clone(),
        config.engine.clone(),
        links,
        config.marketplace.seller_id,
    ));

    let resumed = engine.resume_pending().await;
    info!("Resumed {} vendor orders", resumed);
    engine.spawn_balance_watcher();

    let cancel = CancellationToken::new();
    let pump = tokio::spawn(marketplace::pump(
        market.clone(),
        engine.clone(),
        cancel.clone(),
    ));

    let mut deps = DependencyMap::default();
    deps.insert(warehouse);
    deps.insert(vendor);
    deps.insert(market);
    deps.insert(Operators::new(config.telegram.operators.iter().copied()));
    dialogues::write_deps(&mut deps);

    Dispatcher::builder(bot, schema())
        .dependencies(deps)
        .enable_ctrlc_handler()
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(Arc::new(DisplayErrorHandler))
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Err(e) = pump.await {
        log::error!("Event pump panicked: {}", e);
    }
    engine.shutdown().await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    dptree::entry().chain(common::operators_only()).branch(
        dptree::entry()
            .branch(dialogues::handler())
            .branch(commands::handler())
            .branch(callbacks::handler())
            .branch(Update::filter_message().endpoint(common::default_handler)),
    )
}

/// Decrypts `config.toml.enc` when `AGE_PRIVATE_KEY` is set, reads
/// `config.toml` otherwise.
fn read_config() -> Config {
    let key = std::env::var("AGE_PRIVATE_KEY").ok().map(|key| parse_key(&key));
    load_config(key, Path::new(PLAIN_CONFIG), Path::new(ENCRYPTED_CONFIG))
}

fn load_config(key: Option<age::x25519::Identity>, plain: &Path, encrypted: &Path) -> Config {
    let config = match key {
        Some(key) => {
            let encrypted_config = File::open(encrypted).expect("Can't read encrypted config");
            decrypt(encrypted_config, key)
        }
        None => std::fs::read_to_string(plain).expect("Can't read config"),
    };

    toml::from_str(&config).expect("Can't parse config")
}

fn decrypt(encrypted: impl Read, key: age::x25519::Identity) -> String {
    let decryptor = match age::Decryptor::new(encrypted).expect("Can't initialize decryptor") {
        age::Decryptor::Recipients(d) => d,
        age::Decryptor::Passphrase(_) => panic!("Passphrase-encrypted configs are not supported"),
    };

    let mut reader = decryptor
        .decrypt(std::iter::once(&key as &dyn age::Identity))
        .expect("Can't decrypt config");

    let mut data = String::new();
    reader
        .read_to_string(&mut data)
        .expect("Decrypted config is not UTF-8");

    data
}

fn parse_key(key: &str) -> age::x25519::Identity {
    age::x25519::Identity::from_str(key.trim()).expect("Unable to parse key.")
}

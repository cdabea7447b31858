use crypto_teller::bot::{self, AppState, CommandCooldown};
use crypto_teller::config::{
    get_crypto_cache_ttl, get_crypto_command_cooldown, get_fx_cache_ttl, Settings,
    COOLDOWN_CACHE_MAX_SIZE,
};
use crypto_teller::pricing::{
    CoinMarketCapSource, CryptoPriceFetcher, DexScreenerSource, ExchangeRateApiSource,
    FxRateFetcher, KeyRotator, TokenInfoLookup,
};
use bot::handlers::Command;
use bot::scanner::find_ton_address;
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineQuery};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    /// Configured provider keys, matched literally
    secrets: Option<Regex>,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new(secrets: &[String]) -> Result<Self, regex::Error> {
        let escaped: Vec<String> = secrets
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| regex::escape(s))
            .collect();
        let secrets = if escaped.is_empty() {
            None
        } else {
            Some(Regex::new(&escaped.join("|"))?)
        };

        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            secrets,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = self
            .token1
            .replace_all(input, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        if let Some(secrets) = &self.secrets {
            output = secrets.replace_all(&output, "[MASKED]").to_string();
        }
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Settings come first so their keys can be masked from the very first log line
    let settings = Settings::new();
    let secrets = settings.as_ref().map(Settings::secrets).unwrap_or_default();

    let patterns = Arc::new(RedactionPatterns::new(&secrets).map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting CryptoTeller bot...");

    let settings = match settings {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let bot = Bot::new(settings.telegram_token.clone());
    let state = init_app_state(&settings);
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_app_state(settings: &Settings) -> Arc<AppState> {
    let cmc_rotator = Arc::new(KeyRotator::new("coinmarketcap", settings.cmc_api_keys()));
    let fx_rotator = Arc::new(KeyRotator::new(
        "exchangerate-api",
        settings.exchange_rate_api_keys(),
    ));

    let crypto_ttl = get_crypto_cache_ttl();
    let fx_ttl = get_fx_cache_ttl();
    info!(
        cmc_keys = cmc_rotator.len(),
        fx_keys = fx_rotator.len(),
        crypto_ttl_secs = crypto_ttl.as_secs(),
        fx_ttl_secs = fx_ttl.as_secs(),
        "Initializing price fetchers"
    );

    let prices = Arc::new(CryptoPriceFetcher::new(
        Arc::new(CoinMarketCapSource::new()),
        cmc_rotator,
        crypto_ttl,
    ));
    let rates = Arc::new(FxRateFetcher::new(
        Arc::new(ExchangeRateApiSource::new()),
        fx_rotator,
        fx_ttl,
    ));
    let tokens = TokenInfoLookup::new(
        Arc::new(DexScreenerSource::new()),
        settings.token_chain.clone(),
    )
    .with_selection(settings.pair_selection());

    let cooldown_secs = get_crypto_command_cooldown();
    info!(cooldown_secs, "Initializing /crypto cooldown");
    let cooldown = CommandCooldown::new(cooldown_secs, COOLDOWN_CACHE_MAX_SIZE);

    Arc::new(AppState::new(prices, rates, tokens, cooldown))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(Update::filter_inline_query().endpoint(handle_inline))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| {
                        msg.text().and_then(find_ton_address).is_some()
                    })
                    .endpoint(handle_address),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<AppState>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Crypto => bot::handlers::crypto(bot, msg, state).await,
        Command::Api => bot::handlers::api(bot, msg, state).await,
        Command::Devblog => bot::handlers::devblog(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_page_callback(bot, q, state).await {
        error!("Callback error: {}", e);
    }
    respond(())
}

async fn handle_inline(
    bot: Bot,
    q: InlineQuery,
    state: Arc<AppState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::inline::handle_inline_query(bot, q, state).await {
        error!("Inline query error: {}", e);
    }
    respond(())
}

async fn handle_address(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_address(bot, msg, state).await {
        error!("Address lookup error: {}", e);
    }
    respond(())
}

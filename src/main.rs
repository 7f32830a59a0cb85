//! CLI for amqpsub
//!
//! Subcommands:
//! - `produce`: declare an exchange and publish one message to it
//! - `consume`: declare a queue, bind it, and log messages until interrupted

use std::process::ExitCode;
use std::sync::Arc;

use amqpsub::config::load_config;
use amqpsub::topology::TopologyManager;
use amqpsub::transport::{AmqpConnector, ExchangeKind, ExchangeOptions, QueueOptions};
use amqpsub::utils::{Result, TracingSink, logging};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing::info;

const PRODUCE_EXAMPLES: &str = r#"Examples:

  $ amqpsub produce "Hello World!"
  $ amqpsub produce "Hello World!" -e foo.exchange
  $ amqpsub produce "Hello World!" -e foo.exchange -r another_routing_key
  $ amqpsub produce "Hello World!" -e foo.exchange -r another_routing_key -t fanout
  $ amqpsub produce "Hello World!" -e foo.exchange -r another_routing_key -t fanout -d true
  $ amqpsub produce "Hello World!" -e foo.exchange -r another_routing_key -t fanout -d true -a false
"#;

const CONSUME_EXAMPLES: &str = r#"Examples:

  $ amqpsub consume
  $ amqpsub consume -q foo.queue
  $ amqpsub consume -q foo.queue -r another_routing_key
  $ amqpsub consume -q foo.queue -r another_routing_key -d true
  $ amqpsub consume -q foo.queue -r another_routing_key -d true -a false
  $ amqpsub consume -q foo.queue -e foo.exchange -r another_routing_key
"#;

#[derive(Parser, Debug)]
#[command(name = "amqpsub", version, about = "Produce and consume messages on an AMQP broker")]
struct Cli {
    /// Broker URL (overrides `broker.url` / BROKER_URL)
    #[arg(short, long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Produce a message
    #[command(after_help = PRODUCE_EXAMPLES)]
    Produce {
        message: String,

        /// Exchange name
        #[arg(short, long, default_value = "nodejs.exchange")]
        exchange: String,

        /// Routing key
        #[arg(short, long = "routing_key")]
        routing_key: Option<String>,

        /// Exchange type
        #[arg(short = 't', long = "type", value_enum, default_value_t = ExchangeKind::Direct)]
        kind: ExchangeKind,

        /// Exchange survives a broker restart
        #[arg(short, long, action = ArgAction::Set, default_value_t = false)]
        durable: bool,

        /// Exchange is removed once no queue is bound to it
        #[arg(short, long = "auto_delete", action = ArgAction::Set, default_value_t = true)]
        auto_delete: bool,
    },

    /// Consume messages
    #[command(after_help = CONSUME_EXAMPLES)]
    Consume {
        /// Queue name
        #[arg(short, long, default_value = "nodejs.queue")]
        queue: String,

        /// Exchange to bind to (default: amq.topic)
        #[arg(short, long)]
        exchange: Option<String>,

        /// Routing key pattern (default: #)
        #[arg(short, long = "routing_key")]
        routing_key: Option<String>,

        /// Queue survives a broker restart
        #[arg(short, long, action = ArgAction::Set, default_value_t = false)]
        durable: bool,

        /// Queue is removed once its last consumer goes
        #[arg(short, long = "auto_delete", action = ArgAction::Set, default_value_t = true)]
        auto_delete: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let _ = dotenvy::dotenv();
    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level);

    let url = cli.url.unwrap_or(settings.broker.url);
    let mut manager = TopologyManager::new(
        Arc::new(AmqpConnector::default()),
        url,
        Arc::new(TracingSink),
    );

    let outcome = run(&mut manager, command).await;
    let closed = manager.close().await;

    match outcome.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(manager: &mut TopologyManager, command: Command) -> Result<()> {
    match command {
        Command::Produce {
            message,
            exchange,
            routing_key,
            kind,
            durable,
            auto_delete,
        } => {
            let options = ExchangeOptions {
                kind,
                durable,
                auto_delete,
            };
            manager
                .produce(&exchange, options, &message, routing_key.as_deref())
                .await
        }
        Command::Consume {
            queue,
            exchange,
            routing_key,
            durable,
            auto_delete,
        } => {
            let options = QueueOptions {
                durable,
                auto_delete,
            };
            let consuming = async {
                match exchange.as_deref() {
                    Some(exchange) => {
                        manager
                            .consume_from(&queue, options, exchange, routing_key.as_deref())
                            .await
                    }
                    None => {
                        manager
                            .consume(&queue, options, routing_key.as_deref())
                            .await
                    }
                }
            };

            tokio::select! {
                outcome = consuming => outcome,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received. Exiting gracefully.");
                    Ok(())
                }
            }
        }
    }
}

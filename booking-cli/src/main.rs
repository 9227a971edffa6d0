//! Booking CLI
//!
//! Command-line interface for the Booking API.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use booking_client::BookingClient;
use booking_types::{
    ApiKeyId, ConversationId, CreateServiceRequest, Currency, NotificationId, RequestFilter,
    RequestStatus, Role, ServiceRequestId, UserId,
};

#[derive(Parser)]
#[command(name = "booking")]
#[command(author, version, about = "Booking API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Booking API
    #[arg(long, env = "BOOKING_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "BOOKING_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service request operations
    Request {
        #[command(subcommand)]
        action: RequestCommands,
    },
    /// Conversation operations
    Chat {
        #[command(subcommand)]
        action: ChatCommands,
    },
    /// Notification operations
    Notification {
        #[command(subcommand)]
        action: NotificationCommands,
    },
    /// Start payment for a completed request
    Pay {
        /// Service request ID (UUID)
        id: ServiceRequestId,
    },
    /// Review a completed request
    Review {
        /// Service request ID (UUID)
        id: ServiceRequestId,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: Option<String>,
    },
    /// API key management
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Bootstrap the first (admin) API key
    Bootstrap {
        /// Name for the new API key
        #[arg(long, default_value = "bootstrap-key")]
        name: String,
        /// User the key acts as
        #[arg(long)]
        user_id: Option<UserId>,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum RequestCommands {
    /// Post a new service request
    Create {
        /// Kind of work (e.g. mowing)
        service_type: String,
        #[arg(long)]
        address: String,
        /// Date in YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Price in minor units (e.g. cents)
        #[arg(long)]
        price: Option<i64>,
        /// Currency (USD, EUR, GBP, INR)
        #[arg(long, default_value = "USD")]
        currency: Currency,
    },
    /// Get request details
    Get { id: ServiceRequestId },
    /// List requests; scope with --requester, --provider or --status
    List {
        #[arg(long)]
        requester: Option<UserId>,
        #[arg(long)]
        provider: Option<UserId>,
        /// pending, accepted, completed or cancelled
        #[arg(long)]
        status: Option<RequestStatus>,
    },
    /// Accept a pending request (providers)
    Accept { id: ServiceRequestId },
    /// Mark an accepted request completed (assigned provider)
    Complete { id: ServiceRequestId },
    /// Cancel a request
    Cancel { id: ServiceRequestId },
    /// Delete a request (admin)
    Delete { id: ServiceRequestId },
}

#[derive(Subcommand)]
enum ChatCommands {
    /// Open (or fetch) the conversation of a request
    Open { request_id: ServiceRequestId },
    /// List your conversations
    List,
    /// Show the messages of a conversation
    Messages { id: ConversationId },
    /// Post a message
    Send { id: ConversationId, content: String },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// List your latest notifications
    List,
    /// Mark a notification read
    Read { id: NotificationId },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Create a new API key (admin)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        user_id: UserId,
        /// homeowner, provider or admin
        #[arg(long)]
        role: Role,
    },
    /// List all API keys
    List,
    /// Delete (deactivate) an API key
    Delete {
        #[arg(long)]
        id: ApiKeyId,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = BookingClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Request { action } => match action {
            RequestCommands::Create {
                service_type,
                address,
                date,
                price,
                currency,
            } => {
                let req = CreateServiceRequest {
                    service_type,
                    address: Some(address),
                    scheduled_date: Some(date),
                    price,
                    currency,
                };
                print_json(&client.create_request(&req).await?)?;
            }
            RequestCommands::Get { id } => print_json(&client.get_request(id).await?)?,
            RequestCommands::List {
                requester,
                provider,
                status,
            } => {
                let filter = RequestFilter {
                    requester_id: requester,
                    provider_id: provider,
                    status,
                };
                print_json(&client.list_requests(&filter).await?)?;
            }
            RequestCommands::Accept { id } => print_json(&client.accept(id).await?)?,
            RequestCommands::Complete { id } => print_json(&client.complete(id).await?)?,
            RequestCommands::Cancel { id } => print_json(&client.cancel(id).await?)?,
            RequestCommands::Delete { id } => {
                client.delete_request(id).await?;
                println!("✓ Service request deleted");
            }
        },

        Commands::Chat { action } => match action {
            ChatCommands::Open { request_id } => {
                print_json(&client.open_conversation(request_id).await?)?
            }
            ChatCommands::List => print_json(&client.list_conversations().await?)?,
            ChatCommands::Messages { id } => print_json(&client.list_messages(id).await?)?,
            ChatCommands::Send { id, content } => {
                print_json(&client.post_message(id, content).await?)?
            }
        },

        Commands::Notification { action } => match action {
            NotificationCommands::List => print_json(&client.list_notifications().await?)?,
            NotificationCommands::Read { id } => {
                print_json(&client.mark_notification_read(id).await?)?
            }
        },

        Commands::Pay { id } => print_json(&client.create_payment_intent(id).await?)?,

        Commands::Review {
            id,
            rating,
            comment,
        } => print_json(&client.create_review(id, rating, comment).await?)?,

        Commands::Key { action } => match action {
            KeyCommands::Create {
                name,
                user_id,
                role,
            } => {
                let issued = client.create_api_key(&name, user_id, role).await?;
                println!("{}", issued.api_key);
            }
            KeyCommands::List => print_json(&client.list_api_keys().await?)?,
            KeyCommands::Delete { id } => {
                client.delete_api_key(id).await?;
                println!("✓ API key deleted");
            }
        },

        Commands::Bootstrap { name, user_id } => {
            let issued = client.bootstrap(&name, user_id).await?;
            println!("{}", issued.api_key);
            eprintln!("Acting as user {} ({})", issued.user_id, issued.role);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_typed_arguments() {
        let cli = Cli::try_parse_from([
            "booking",
            "request",
            "create",
            "mowing",
            "--address",
            "123 Maple Ave",
            "--date",
            "2026-05-01",
            "--currency",
            "eur",
        ])
        .unwrap();

        match cli.command {
            Commands::Request {
                action: RequestCommands::Create { date, currency, price, .. },
            } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
                assert_eq!(currency, Currency::EUR);
                assert!(price.is_none());
            }
            _ => panic!("expected request create"),
        }
    }

    #[test]
    fn test_rejects_malformed_id() {
        assert!(Cli::try_parse_from(["booking", "request", "get", "not-a-uuid"]).is_err());
    }
}

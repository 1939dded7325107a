use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use room_booking_client::{
    reserve, ApiError, BookingApi, ClientConfig, Credentials, HttpBookingApi, MyBookings,
    Registration, ReservationRequest, RoomRef, Session,
};

#[derive(Parser)]
#[command(name = "booking", about = "Browse rooms, book stays and manage your bookings")]
struct Cli {
    /// Base url of the booking API (defaults to BOOKING_API_URL or http://127.0.0.1:8000)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[arg(long, env = "BOOKING_USERNAME", global = true)]
    username: Option<String>,

    #[arg(long, env = "BOOKING_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all rooms
    Rooms,
    /// Show one room
    Room { id: u64 },
    /// Create an account (uses --username and --password)
    Register {
        #[arg(long)]
        email: String,
    },
    /// Book a room for an inclusive date range (YYYY-MM-DD)
    Book { room_id: u64, from: String, to: String },
    /// List your bookings
    Bookings,
    /// Cancel the booking of a room starting and ending on the given days
    Cancel { room_id: u64, from: String, to: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.api_url.clone() {
        config.base_url = url;
    }
    let api = HttpBookingApi::new(config)?;

    let result = run(&cli, &api).await;
    debug!(stats = ?api.stats(), "done");
    result
}

async fn run(cli: &Cli, api: &HttpBookingApi) -> Result<()> {
    match &cli.command {
        Command::Rooms => {
            let rooms = api.list_rooms().await.context("Failed to load rooms")?;
            if rooms.is_empty() {
                println!("No rooms available.");
            }
            for room in rooms {
                println!("{}", room.summary());
            }
        }
        Command::Room { id } => {
            let room = api
                .get_room(&RoomRef::from_id(*id))
                .await
                .context("Failed to load room")?;
            println!("{}", room.summary());
            if !room.description.is_empty() {
                println!("{}", room.description);
            }
            if let Some(image) = room.primary_image() {
                println!("image: {}", image);
            }
        }
        Command::Register { email } => {
            let (username, password) = credentials(cli)?;
            let registration = Registration {
                username,
                email: email.clone(),
                password,
            };
            let session = Session::register(api, &registration)
                .await
                .context("Register failed")?;
            println!("Registered {}", session.user().label());
            session.logout();
        }
        Command::Book { room_id, from, to } => {
            let request = ReservationRequest::parse(from, to)?;
            let session = login(cli, api).await?;
            let room = api
                .get_room(&RoomRef::from_id(*room_id))
                .await
                .context("Failed to load room")?;
            let confirmation = reserve(api, &session, &room, &request).await?;
            println!(
                "{} ({} to {})",
                confirmation.message,
                request.from_date(),
                request.to_date()
            );
            session.logout();
        }
        Command::Bookings => {
            let session = login(cli, api).await?;
            let bookings = MyBookings::new(api.config().max_concurrent_lookups);
            bookings
                .refresh(api, &session)
                .await
                .context("Failed to load bookings")?;

            let list = bookings.snapshot();
            if list.is_empty() {
                println!("You have no bookings yet.");
            }
            for entry in &list.entries {
                println!(
                    "{}: {} -> {} ({} day(s), {} record(s)) for {}",
                    entry.room_name,
                    entry.range.start_date.format("%d/%m/%Y"),
                    entry.range.end_date.format("%d/%m/%Y"),
                    entry.days(),
                    entry.range.member_ids.len(),
                    session.user().label()
                );
            }
            for room in &list.unsummarized {
                println!(
                    "{}: could not summarize bookings for this room ({})",
                    room.room_name, room.reason
                );
            }
            session.logout();
        }
        Command::Cancel { room_id, from, to } => {
            let request = ReservationRequest::parse(from, to)?;
            let session = login(cli, api).await?;
            let bookings = MyBookings::new(api.config().max_concurrent_lookups);
            bookings
                .refresh(api, &session)
                .await
                .context("Failed to load bookings")?;

            let path = RoomRef::from_id(*room_id).request_path();
            let Some(entry) = bookings.entries().into_iter().find(|entry| {
                entry.room_ref().request_path() == path
                    && entry.range.start_date == request.from_date()
                    && entry.range.end_date == request.to_date()
            }) else {
                bail!("No booking of room {} from {} to {}", room_id, from, to);
            };

            let cancelled = bookings.cancel(api, &session, &entry.key()).await?;
            println!(
                "Booking cancelled: {} {} -> {}",
                cancelled.room_name, cancelled.range.start_date, cancelled.range.end_date
            );
            session.logout();
        }
    }
    Ok(())
}

fn credentials(cli: &Cli) -> Result<(String, String)> {
    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => Ok((username.clone(), password.clone())),
        _ => bail!("--username and --password (or BOOKING_USERNAME / BOOKING_PASSWORD) are required"),
    }
}

async fn login(cli: &Cli, api: &dyn BookingApi) -> Result<Session> {
    let (username, password) = credentials(cli)?;
    match Session::login(api, &Credentials::new(username, password)).await {
        Ok(session) => Ok(session),
        Err(ApiError::Unauthorized(message)) => bail!("Login failed: {}", message),
        Err(e) => Err(e).context("Login failed"),
    }
}

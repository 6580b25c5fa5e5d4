/// Command-line console for the appointment calendar.
///
/// This binary runs the scheduling core against an in-memory store for one
/// clinic account, and provides an interactive menu for browsing the
/// calendar, today's agenda, and booking or changing appointments.

use chrono::{Datelike, Duration, Local, NaiveTime};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vetcal::agenda::{AgendaBuilder, AgendaScreen};
use vetcal::calendar::{CalendarBuilder, CalendarScreen};
use vetcal::clients::{ClientDirectory, StoreClientDirectory};
use vetcal::config::SchedulerConfig;
use vetcal::form::AppointmentForm;
use vetcal::gateway::AppointmentGateway;
use vetcal::identity::{IdentityProvider, SessionIdentity, UserId};
use vetcal::models::{AppointmentDraft, AppointmentPatch, ClientDraft};
use vetcal::status::Status;
use vetcal::store::MemoryStore;
use vetcal::time::{format_day, format_range, local_to_instant, Clock, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "vetcal", version, about = "Clinic appointment calendar console")]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "VETCAL_CONFIG")]
    config: Option<PathBuf>,

    /// Clinic account to sign in as.
    #[arg(long, default_value = "demo-clinic")]
    clinic: String,

    /// Seed sample clients and appointments before starting.
    #[arg(long)]
    demo: bool,
}

/// Zero-based position for a one-based menu choice.
fn menu_index(choice: i64) -> Option<usize> {
    choice.checked_sub(1).and_then(|i| usize::try_from(i).ok())
}

struct AppointmentCLI {
    config: SchedulerConfig,
    clinic: UserId,
    identity: Arc<SessionIdentity>,
    directory: Arc<StoreClientDirectory>,
    gateway: AppointmentGateway,
    calendar: CalendarScreen,
    agenda: AgendaScreen,
    running: bool,
}

impl AppointmentCLI {
    fn new(config: SchedulerConfig, clinic: UserId) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let identity = Arc::new(SessionIdentity::signed_in(clinic.clone()));
        let directory = Arc::new(StoreClientDirectory::new(store.clone(), identity.clone()));
        let gateway = AppointmentGateway::new(store, identity.clone());

        let calendar = CalendarScreen::new(CalendarBuilder::new(
            gateway.clone(),
            directory.clone(),
            identity.clone(),
            config.clone(),
        ));
        let agenda = AgendaScreen::new(AgendaBuilder::new(
            gateway.clone(),
            directory.clone(),
            identity.clone(),
            clock,
            config.clone(),
        ));

        AppointmentCLI {
            config,
            clinic,
            identity,
            directory,
            gateway,
            calendar,
            agenda,
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       CLINIC APPOINTMENT CALENDAR");
        println!("{}", "=".repeat(60));
    }

    fn print_menu(&self) {
        let signed_in = match self.identity.current_user() {
            Some(user) => format!("signed in as {}", user),
            None => "signed out".to_string(),
        };
        println!("\n--- Main Menu ({}) ---", signed_in);
        println!("1. Week calendar");
        println!("2. Today's agenda");
        println!("3. New appointment");
        println!("4. Appointment details");
        println!("5. Change appointment status");
        println!("6. Delete appointment from today's agenda");
        println!("7. Clients");
        println!("8. Sign in / sign out");
        println!("9. Seed demo data");
        println!("0. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        // A failed flush or read just falls back to the default.
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            input.clear();
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i64>) -> i64 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i64>() {
                return value;
            }
            println!("Please enter a valid number");
        }
    }

    async fn show_week(&self) {
        self.calendar.reload().await;
        let snapshot = self.calendar.snapshot();
        if let Some(message) = snapshot.error_message() {
            println!("\n{}", message);
        }
        let Some(view) = snapshot.data else {
            return;
        };

        let today = Local::now().date_naive();
        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let columns = match view.week_grid(week_start, &self.config.calendar) {
            Ok(columns) => columns,
            Err(e) => {
                println!("\nCannot draw the week: {}", e);
                return;
            }
        };

        let locale = self.config.locale();
        println!(
            "\n--- Week of {} ({} appointment(s) in total) ---",
            week_start.format("%Y-%m-%d"),
            view.len()
        );
        for column in columns {
            let badge = view.month_badge(column.date).unwrap_or_default();
            println!("\n{}  {}", column.date.format("%A, %Y-%m-%d"), badge);
            for row in column.rows.iter().filter(|row| !row.event_ids.is_empty()) {
                for event in row.event_ids.iter().filter_map(|id| view.find(id)) {
                    println!(
                        "  {}  {:13} {:20} {} [{}]",
                        row.start.format("%H:%M"),
                        format_range(Some(event.start), event.end, locale),
                        event.title,
                        event.meta.reason,
                        event.meta.status.label()
                    );
                }
            }
        }

        let overlaps = view.overlapping_pairs();
        if !overlaps.is_empty() {
            println!("\n{} overlapping pair(s) stacked on the grid", overlaps.len());
        }
    }

    async fn show_agenda(&self) -> Vec<String> {
        self.agenda.reload().await;
        let snapshot = self.agenda.snapshot();
        if let Some(message) = snapshot.error_message() {
            println!("\n{}", message);
        }
        let Some(agenda) = snapshot.data else {
            return Vec::new();
        };

        println!("\n--- {} ---", self.agenda.builder().today_label());
        if agenda.is_empty() {
            println!("No appointments today");
            return Vec::new();
        }

        let locale = self.config.locale();
        for (i, entry) in agenda.entries.iter().enumerate() {
            println!(
                "  {}. {:13} {:20} {} [{}]",
                i + 1,
                entry.time_label(locale),
                entry.client_name,
                entry.reason,
                entry.status.label()
            );
            if !entry.notes.is_empty() {
                println!("     {}", entry.notes);
            }
        }
        agenda.entries.into_iter().map(|e| e.id).collect()
    }

    async fn new_appointment(&self) {
        println!("\n--- New Appointment ---");

        let days_ahead = self.get_int_input("Days from today", Some(1));
        let hour = self.get_int_input("Hour (0-23)", Some(10));
        let minute = self.get_int_input("Minute (0-59)", Some(0));
        let length = self.get_int_input(
            "Length in minutes (0 for the default slot)",
            Some(0),
        );

        let time = u32::try_from(hour)
            .ok()
            .zip(u32::try_from(minute).ok())
            .and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
        let Some(time) = time else {
            println!("\nInvalid time");
            return;
        };
        let day = Duration::try_days(days_ahead)
            .and_then(|offset| Local::now().date_naive().checked_add_signed(offset));
        let Some(day) = day else {
            println!("\nInvalid time");
            return;
        };
        let Some(start) = local_to_instant(day.and_time(time)) else {
            println!("\nThat time does not exist locally");
            return;
        };

        let builder = self.calendar.builder();
        let navigation = if length > 0 {
            let end = Duration::try_minutes(length).and_then(|l| start.checked_add_signed(l));
            let Some(end) = end else {
                println!("\nInvalid time");
                return;
            };
            builder.select(start, end)
        } else {
            builder.slot_click(start)
        };

        let Some(mut form) = AppointmentForm::from_navigation(&navigation, self.config.clone())
        else {
            return;
        };
        if let Err(e) = form.load_clients(self.directory.as_ref()).await {
            println!("\n{}", e.user_message());
            return;
        }

        println!("\n{} · {}", form.day_label(), form.time_label());
        if form.picker_enabled() {
            for (i, client) in form.clients().iter().enumerate() {
                println!("  {}. {}", i + 1, client.full_name);
            }
            let choice = self.get_int_input("Client", Some(1));
            let picked = menu_index(choice)
                .and_then(|i| form.clients().get(i))
                .map(|c| c.id.clone());
            form.select_client(picked.as_deref());
        } else {
            println!("No active clients; add one first (option 7)");
        }

        let reason = self.get_input("Reason", Some(form.reason()));
        form.set_reason(reason);
        form.set_notes(self.get_input("Notes", Some("")));

        match form.submit(&self.gateway, self.identity.as_ref()).await {
            Ok(next) => println!("\nAppointment created, returning to {}", next.path()),
            Err(e) => println!("\n{}", e.user_message()),
        }
    }

    /// Let the user pick one of the calendar's events.
    async fn pick_event(&self) -> Option<vetcal::calendar::CalendarEvent> {
        self.calendar.reload().await;
        let snapshot = self.calendar.snapshot();
        if let Some(message) = snapshot.error_message() {
            println!("\n{}", message);
        }
        let view = snapshot.data?;
        if view.is_empty() {
            println!("\nNo appointments");
            return None;
        }

        let locale = self.config.locale();
        for (i, event) in view.events.iter().enumerate() {
            println!(
                "  {}. {} {} - {}",
                i + 1,
                format_day(Some(event.start), locale),
                format_range(Some(event.start), event.end, locale),
                event.title
            );
        }
        let choice = self.get_int_input("Select appointment (0 to go back)", Some(0));
        menu_index(choice)
            .and_then(|i| view.events.get(i))
            .cloned()
    }

    async fn show_details(&self) {
        println!("\n--- Appointment Details ---");
        let Some(event) = self.pick_event().await else {
            return;
        };

        let detail = self.calendar.builder().event_click(&event);
        let locale = self.config.locale();
        println!("\n{}", detail.client_name);
        println!("{}", detail.subtitle(locale));
        println!("  Reason: {}", detail.reason);
        println!("  Status: {}", detail.status.label());
        if !detail.notes.is_empty() {
            println!("  Notes:  {}", detail.notes);
        }
        for action in detail.actions() {
            println!("  -> {}", action.path());
        }
    }

    async fn change_status(&self) {
        println!("\n--- Change Status ---");
        let Some(event) = self.pick_event().await else {
            return;
        };

        println!("  1. Scheduled\n  2. Done\n  3. Cancelled");
        let status = match self.get_int_input("New status", Some(1)) {
            2 => Status::Done,
            3 => Status::Cancelled,
            _ => Status::Scheduled,
        };

        match self
            .gateway
            .update(&event.id, AppointmentPatch::status(status.clone()))
            .await
        {
            Ok(()) => println!("\n{} is now {}", event.title, status.label()),
            Err(e) => println!("\n{}", e.user_message()),
        }
    }

    async fn delete_from_agenda(&self) {
        println!("\n--- Delete Appointment ---");
        let ids = self.show_agenda().await;
        if ids.is_empty() {
            return;
        }

        let choice = self.get_int_input("Select appointment to delete (0 to go back)", Some(0));
        let Some(id) = menu_index(choice).and_then(|i| ids.get(i)) else {
            return;
        };

        let confirm = self.get_input("Delete this appointment? (y/n)", Some("n"));
        if confirm.to_lowercase() != "y" {
            return;
        }

        match self.agenda.delete(id).await {
            Ok(()) => println!("\nAppointment deleted"),
            Err(e) => println!("\n{}", e.user_message()),
        }
    }

    async fn manage_clients(&self) {
        println!("\n--- Clients ---");
        match self.directory.list_clients().await {
            Ok(clients) if clients.is_empty() => println!("No clients yet"),
            Ok(clients) => {
                for client in clients {
                    let state = if client.active { "" } else { " (inactive)" };
                    println!("  {}{}", client.full_name, state);
                }
            }
            Err(e) => {
                println!("{}", e.user_message());
                return;
            }
        }

        let name = self.get_input("New client name (empty to go back)", None);
        if name.is_empty() {
            return;
        }
        let mut draft = ClientDraft::named(name);
        draft.phone = self.get_input("Phone", Some(""));
        draft.email = self.get_input("Email", Some(""));

        match self.directory.create_client(draft).await {
            Ok(_) => println!("\nClient added"),
            Err(e) => println!("\n{}", e.user_message()),
        }
    }

    fn toggle_session(&self) {
        if self.identity.current_user().is_some() {
            self.identity.sign_out();
            println!("\nSigned out");
        } else {
            let clinic = self.get_input("Clinic account", Some(self.clinic.as_str()));
            self.identity.sign_in(UserId::new(clinic));
            println!("\nSigned in");
        }
    }

    async fn seed_demo(&self) {
        println!("\n--- Seeding Demo Data ---");

        let mut client_ids = Vec::new();
        for name in ["John Smith", "Jane Doe", "Bob Wilson"] {
            match self.directory.create_client(ClientDraft::named(name)).await {
                Ok(id) => client_ids.push(id),
                Err(e) => {
                    println!("{}", e.user_message());
                    return;
                }
            }
        }

        let today = Local::now().date_naive();
        let bookings = [
            (0, 9, 0, 30, 0, "Annual checkup", Status::Scheduled),
            (0, 9, 15, 30, 1, "Vaccines", Status::from_string("confirmed")),
            (0, 14, 0, 45, 2, "Follow-up", Status::Scheduled),
            (1, 11, 0, 30, 0, "", Status::Scheduled),
            (-1, 10, 0, 30, 1, "Dental cleaning", Status::Done),
        ];

        let mut created = 0;
        for (offset, hour, minute, length, client, reason, status) in bookings {
            let Some(start) = NaiveTime::from_hms_opt(hour, minute, 0)
                .and_then(|t| local_to_instant((today + Duration::days(offset)).and_time(t)))
            else {
                continue;
            };
            let draft = AppointmentDraft::new(
                client_ids[client].clone(),
                start,
                start + Duration::minutes(length),
            )
            .with_reason(reason)
            .with_status(status);

            match self.gateway.create(draft).await {
                Ok(_) => created += 1,
                Err(e) => println!("{}", e.user_message()),
            }
        }

        println!("Created {} clients and {} appointments", client_ids.len(), created);
        println!("Note: the two morning appointments today overlap; both were accepted.");
    }

    async fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(2));

            match choice {
                1 => self.show_week().await,
                2 => {
                    self.show_agenda().await;
                }
                3 => self.new_appointment().await,
                4 => self.show_details().await,
                5 => self.change_status().await,
                6 => self.delete_from_agenda().await,
                7 => self.manage_clients().await,
                8 => self.toggle_session(),
                9 => self.seed_demo().await,
                0 => {
                    self.running = false;
                    self.calendar.close();
                    self.agenda.close();
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match SchedulerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("vetcal: {}", e);
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("vetcal starting v{}", env!("CARGO_PKG_VERSION"));

    let mut cli = AppointmentCLI::new(config, UserId::new(args.clinic));
    if args.demo {
        cli.seed_demo().await;
    }
    cli.run().await;
}

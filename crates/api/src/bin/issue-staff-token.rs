//! Staff token utility for the helpline service
//!
//! Signs a staff or admin JWT with `JWT_SECRET` so a deployment can be
//! exercised without the upstream identity provider.
//!
//! Usage:
//!   cargo run --bin issue-staff-token -- <staff-id> <display-name> [staff|admin] [ttl-hours]
//!
//! Example:
//!   cargo run --bin issue-staff-token -- s-104 "Meera" admin 8

use std::env;

use helpline_api::auth::JwtManager;
use helpline_shared::ParticipantRole;
use time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let (Some(staff_id), Some(name)) = (args.next(), args.next()) else {
        eprintln!("Usage: issue-staff-token <staff-id> <display-name> [staff|admin] [ttl-hours]");
        std::process::exit(2);
    };
    let role: ParticipantRole = args.next().as_deref().unwrap_or("staff").parse()?;
    let ttl_hours: i64 = args.next().as_deref().unwrap_or("12").parse()?;

    let secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET is not set")?;
    if secret.len() < 32 {
        return Err("JWT_SECRET must be at least 32 characters".into());
    }

    let token = JwtManager::new(&secret).generate_token(
        &staff_id,
        &name,
        role,
        Duration::hours(ttl_hours),
    )?;

    println!("{}", token);
    Ok(())
}

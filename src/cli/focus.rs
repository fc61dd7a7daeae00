use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};

pub async fn run() -> Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("Failed to connect to session D-Bus")?;

    let listeners: u32 = connection
        .call_method(
            Some(DBUS_NAME),
            DBUS_PATH,
            Some(DBUS_NAME),
            "ForegroundRegained",
            &(),
        )
        .await
        .context("Failed to call ForegroundRegained - is the daemon running?")?
        .body()
        .deserialize()
        .context("Failed to deserialize response")?;

    if listeners == 0 {
        println!("Daemon has no active foreground listener");
    } else {
        println!("Foreground refresh triggered");
    }
    Ok(())
}

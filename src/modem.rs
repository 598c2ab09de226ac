//! Cellular modem on UARTE0.
//!
//! Two halves run side by side: the reader assembles response lines and
//! forwards call URCs as `ModemEvent`s, the writer turns queued
//! `ModemCommand`s into AT command lines.

use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::{UarteRx, UarteTx};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use handset::config::MODEM_QUEUE_DEPTH;
use handset::device::{ModemCommand, ModemEvent};
use heapless::String;

/// Longest response line kept; longer lines are truncated.
const LINE_LEN: usize = 96;

/// Forward call URCs from the modem.
async fn read_events(
    rx: &mut UarteRx<'_, UARTE0>,
    events: Sender<'_, CriticalSectionRawMutex, ModemEvent, MODEM_QUEUE_DEPTH>,
) -> ! {
    let mut line: String<LINE_LEN> = String::new();
    let mut byte = [0u8; 1];

    loop {
        if let Err(e) = rx.read(&mut byte).await {
            warn!("Modem: read error {:?}", e);
            line.clear();
            continue;
        }

        match byte[0] {
            b'\r' => {}
            b'\n' => {
                if let Some(event) = ModemEvent::from_urc(&line) {
                    info!("Modem: {:?}", event);
                    events.send(event).await;
                } else if !line.is_empty() {
                    debug!("Modem: {}", line.as_str());
                }
                line.clear();
            }
            b => {
                let _ = line.push(b as char);
            }
        }
    }
}

/// Send queued commands to the modem.
async fn write_commands(
    tx: &mut UarteTx<'_, UARTE0>,
    commands: Receiver<'_, CriticalSectionRawMutex, ModemCommand, MODEM_QUEUE_DEPTH>,
) -> ! {
    loop {
        let command = commands.receive().await;
        let line = match command.to_at() {
            Ok(line) => line,
            Err(e) => {
                warn!("Modem: cannot encode {:?}: {:?}", command, e);
                continue;
            }
        };
        if let Err(e) = tx.write(line.as_bytes()).await {
            warn!("Modem: write error {:?}", e);
        }
    }
}

pub async fn modem_task(
    mut rx: UarteRx<'_, UARTE0>,
    mut tx: UarteTx<'_, UARTE0>,
    events: Sender<'_, CriticalSectionRawMutex, ModemEvent, MODEM_QUEUE_DEPTH>,
    commands: Receiver<'_, CriticalSectionRawMutex, ModemCommand, MODEM_QUEUE_DEPTH>,
) -> ! {
    info!("Modem: task started");
    match select(read_events(&mut rx, events), write_commands(&mut tx, commands)).await {
        Either::First(never) | Either::Second(never) => never,
    }
}

//! Event dispatcher: the single consumer of the input queue.
//!
//! Waits on three sources at once: decoded button events, audio-stack
//! notifications and the radio's browse-commit deadline. Whichever is
//! ready first is handed to the [`HeadUnit`]; nothing else mutates it.
//! With no events and no pending deadline the task simply sleeps.

use crate::audio::{AudioStack, StackReceiver};
use crate::display::DisplaySink;
use crate::head_unit::HeadUnit;
use crate::input::EventReceiver;
use crate::storage::SettingsStore;
use embassy_futures::select::{select3, Either3};
use embassy_time::{Instant, Timer};

/// Handle the next ready event.
pub async fn dispatch_one<S, D, A>(unit: &mut HeadUnit<S, D, A>, buttons: &EventReceiver<'_>, stack: &StackReceiver<'_>)
where
    S: SettingsStore,
    D: DisplaySink,
    A: AudioStack,
{
    let deadline = unit.browse_deadline();
    let browse_timer = async {
        match deadline {
            Some(at) => Timer::at(at).await,
            None => core::future::pending::<()>().await,
        }
    };

    match select3(buttons.receive(), stack.receive(), browse_timer).await {
        Either3::First(event) => {
            debug!("Dispatch: {}", event);
            unit.handle_button_event(event).await;
        }
        Either3::Second(event) => {
            debug!("Dispatch: stack {}", event);
            unit.handle_stack_event(event).await;
        }
        Either3::Third(()) => unit.on_browse_deadline(Instant::now()).await,
    }
}

/// Dispatcher loop. Spawn this in its own task.
pub async fn run<S, D, A>(mut unit: HeadUnit<S, D, A>, buttons: EventReceiver<'_>, stack: StackReceiver<'_>) -> !
where
    S: SettingsStore,
    D: DisplaySink,
    A: AudioStack,
{
    info!("Dispatcher started in {}", unit.get_mode());
    loop {
        dispatch_one(&mut unit, &buttons, &stack).await;
    }
}

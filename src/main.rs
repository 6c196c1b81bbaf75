//! # Kestrel Demo Firmware
//!
//! The dual-channel blinker: two potentiometers set the blink
//! half-periods of two LEDs, and every accepted change is reported over
//! the log sink.
//!
//! | Task | Priority | Role |
//! |------|----------|------|
//! | `logger_task` | 3 | Drains the log queue, formats, writes the sink |
//! | `sampler_task` | 2 | Samples both pots, gates on the change threshold |
//! | `actuator_task` ×2 | 1 | Blinks one LED at its channel's half-period |
//! | idle | 0 | `wfi` when nothing else is runnable |
//!
//! The logger outranks the producers (slow sink, shallow queue: drain
//! it the moment something arrives). The sampler publishes through two
//! paths at once — the mutex-guarded shared cell the actuators poll,
//! and the queue the logger sleeps on. Until the first sample lands,
//! the shared cell holds no value and the actuators skip toggling.
//!
//! This is firmware: build it for the board. On the host the binary is
//! an empty stub and all development happens through the library tests.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod board;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    #[cfg(feature = "defmt")]
    use defmt_rtt as _;
    use panic_halt as _;

    use kestrel::app::{format_snapshot, Channel, DelaySnapshot, Sampler, SharedDelays};
    use kestrel::cell::UPCell;
    use kestrel::config::{
        ACTUATOR_RETRY_TICKS, LOGGER_TIMEOUT_TICKS, LOG_QUEUE_DEPTH, SAMPLE_PERIOD_TICKS,
        SAMPLE_SETTLE_TICKS,
    };
    use kestrel::io::{AnalogSource, DigitalOut, LineBuf, LogSink};
    use kestrel::kernel;
    use kestrel::task::TaskConfig;
    use kestrel::time::{ms_to_ticks, Timeout};

    use crate::board;

    /// Kernel object handles, filled in by `main` before `start`.
    #[derive(Clone, Copy)]
    struct Handles {
        delays_mutex: usize,
        log_queue: usize,
    }

    /// Blink half-periods, guarded by `delays_mutex`. Reads and writes
    /// happen only between take and give.
    static DELAYS: UPCell<SharedDelays> = unsafe { UPCell::new(SharedDelays::new()) };

    static HANDLES: UPCell<Handles> = unsafe {
        UPCell::new(Handles {
            delays_mutex: 0,
            log_queue: 0,
        })
    };

    // -----------------------------------------------------------------------
    // Task bodies
    // -----------------------------------------------------------------------

    extern "C" fn sampler_task(_arg: usize) -> ! {
        let handles = HANDLES.with(|h| *h);
        let mut red_pot = board::Pot::new(board::RED_POT_CHANNEL);
        let mut yellow_pot = board::Pot::new(board::YELLOW_POT_CHANNEL);
        let mut sampler = Sampler::new();

        loop {
            kernel::delay(SAMPLE_PERIOD_TICKS);

            kernel::delay(SAMPLE_SETTLE_TICKS);
            let red_raw = red_pot.sample();
            kernel::delay(SAMPLE_SETTLE_TICKS);
            let yellow_raw = yellow_pot.sample();

            if let Some(snapshot) = sampler.evaluate(red_raw, yellow_raw) {
                if kernel::mutex_take(handles.delays_mutex, Timeout::Forever).is_ok() {
                    DELAYS.with(|d| d.set_all(snapshot));
                    let _ = kernel::mutex_give(handles.delays_mutex);
                }
                if kernel::queue_send(handles.log_queue, &snapshot.to_bytes(), Timeout::Forever)
                    .is_err()
                {
                    kestrel::error!("log queue send failed");
                }
            }
        }
    }

    extern "C" fn actuator_task(arg: usize) -> ! {
        let handles = HANDLES.with(|h| *h);
        let channel = Channel::from_index(arg);
        let mut led = board::Led::new(match channel {
            Channel::Red => board::RED_LED_PIN,
            Channel::Yellow => board::YELLOW_LED_PIN,
        });

        loop {
            let mut half_period_ms = None;
            if kernel::mutex_take(handles.delays_mutex, Timeout::Forever).is_ok() {
                half_period_ms = DELAYS.with(|d| d.get(channel));
                let _ = kernel::mutex_give(handles.delays_mutex);
            }
            match half_period_ms {
                Some(ms) => {
                    led.toggle();
                    kernel::delay(ms_to_ticks(ms as u32));
                }
                // Nothing sampled yet: no blinking at a made-up rate
                None => kernel::delay(ACTUATOR_RETRY_TICKS),
            }
        }
    }

    extern "C" fn logger_task(_arg: usize) -> ! {
        let handles = HANDLES.with(|h| *h);
        let mut sink = board::Console::new();
        let mut line = LineBuf::new();
        let mut msg = [0u8; DelaySnapshot::WIRE_LEN];

        loop {
            match kernel::queue_receive(
                handles.log_queue,
                &mut msg,
                Timeout::Ticks(LOGGER_TIMEOUT_TICKS),
            ) {
                Ok(_) => {
                    let snapshot = DelaySnapshot::from_bytes(&msg);
                    format_snapshot(&snapshot, &mut line);
                    sink.write_line(line.as_str());
                }
                // A starved producer, not a kernel fault: say so and
                // keep listening
                Err(_) => sink.write_line("log: no samples received"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    #[entry]
    fn main() -> ! {
        board::init();
        kernel::init();

        let delays_mutex = kernel::mutex_create().expect("mutex slot");
        let log_queue =
            kernel::queue_create(DelaySnapshot::WIRE_LEN, LOG_QUEUE_DEPTH).expect("queue slot");
        HANDLES.with(|h| {
            *h = Handles {
                delays_mutex,
                log_queue,
            }
        });

        kernel::create_task(
            logger_task,
            0,
            TaskConfig {
                priority: 3,
                stack_size: 1024,
                time_slice: 0,
            },
        )
        .expect("logger task");

        kernel::create_task(
            sampler_task,
            0,
            TaskConfig {
                priority: 2,
                stack_size: 1024,
                time_slice: 0,
            },
        )
        .expect("sampler task");

        kernel::create_task(
            actuator_task,
            Channel::Red.index(),
            TaskConfig {
                priority: 1,
                stack_size: 512,
                time_slice: 0,
            },
        )
        .expect("red actuator task");

        kernel::create_task(
            actuator_task,
            Channel::Yellow.index(),
            TaskConfig {
                priority: 1,
                stack_size: 512,
                time_slice: 0,
            },
        )
        .expect("yellow actuator task");

        let cp = cortex_m::Peripherals::take().unwrap();
        kernel::start(cp)
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {
    eprintln!("kestrel is firmware; build with --target thumbv7em-none-eabihf");
}

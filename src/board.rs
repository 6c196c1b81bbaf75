//! # Board Support — Nucleo-F401RE
//!
//! Register-level drivers for the demo wiring, implementing the
//! kernel's collaborator traits:
//!
//! - PA5 / PA6 — red and yellow LEDs (push-pull outputs)
//! - PA0 / PA1 — potentiometers on ADC1 channels 0 and 1
//! - log lines — RTT via `defmt` when the feature is on, dropped
//!   otherwise
//!
//! Just enough driver to run the demo; a real product would pull in a
//! HAL crate instead.

use core::ptr::{read_volatile, write_volatile};

use kestrel::io::{AnalogSource, DigitalOut, LogSink};

const RCC: usize = 0x4002_3800;
const RCC_AHB1ENR: *mut u32 = (RCC + 0x30) as *mut u32;
const RCC_APB2ENR: *mut u32 = (RCC + 0x44) as *mut u32;

const GPIOA: usize = 0x4002_0000;
const GPIOA_MODER: *mut u32 = GPIOA as *mut u32;
const GPIOA_ODR: *mut u32 = (GPIOA + 0x14) as *mut u32;

const ADC1: usize = 0x4001_2000;
const ADC_SR: *mut u32 = ADC1 as *mut u32;
const ADC_CR2: *mut u32 = (ADC1 + 0x08) as *mut u32;
const ADC_SMPR2: *mut u32 = (ADC1 + 0x10) as *mut u32;
const ADC_SQR3: *mut u32 = (ADC1 + 0x34) as *mut u32;
const ADC_DR: *mut u32 = (ADC1 + 0x4C) as *mut u32;

const ADC_CR2_ADON: u32 = 1;
const ADC_CR2_SWSTART: u32 = 1 << 30;
const ADC_SR_EOC: u32 = 1 << 1;

pub const RED_LED_PIN: u32 = 5;
pub const YELLOW_LED_PIN: u32 = 6;
pub const RED_POT_CHANNEL: u32 = 0;
pub const YELLOW_POT_CHANNEL: u32 = 1;

/// Clock the peripherals and set the pin modes. Call once before the
/// kernel starts.
pub fn init() {
    unsafe {
        write_volatile(RCC_AHB1ENR, read_volatile(RCC_AHB1ENR) | 1); // GPIOA
        write_volatile(RCC_APB2ENR, read_volatile(RCC_APB2ENR) | (1 << 8)); // ADC1

        // PA5/PA6 outputs (0b01), PA0/PA1 analog (0b11)
        let mut moder = read_volatile(GPIOA_MODER);
        moder &= !((0b11 << 10) | (0b11 << 12) | (0b11 << 0) | (0b11 << 2));
        moder |= (0b01 << 10) | (0b01 << 12) | (0b11 << 0) | (0b11 << 2);
        write_volatile(GPIOA_MODER, moder);

        // Generous sample time on channels 0 and 1, converter on
        write_volatile(ADC_SMPR2, 0b111 | (0b111 << 3));
        write_volatile(ADC_CR2, ADC_CR2_ADON);
    }
}

/// One LED pin.
pub struct Led {
    mask: u32,
}

impl Led {
    pub fn new(pin: u32) -> Self {
        Self { mask: 1 << pin }
    }
}

impl DigitalOut for Led {
    fn toggle(&mut self) {
        unsafe {
            write_volatile(GPIOA_ODR, read_volatile(GPIOA_ODR) ^ self.mask);
        }
    }
}

/// One potentiometer on an ADC1 regular channel.
pub struct Pot {
    channel: u32,
}

impl Pot {
    pub fn new(channel: u32) -> Self {
        Self { channel }
    }
}

impl AnalogSource for Pot {
    fn sample(&mut self) -> u16 {
        unsafe {
            write_volatile(ADC_SQR3, self.channel);
            write_volatile(ADC_CR2, ADC_CR2_ADON | ADC_CR2_SWSTART);
            while read_volatile(ADC_SR) & ADC_SR_EOC == 0 {}
            // 12-bit conversion, scaled to the 10-bit range the sampler expects
            ((read_volatile(ADC_DR) & 0x0FFF) >> 2) as u16
        }
    }
}

/// Log-line sink. Lines go out over RTT when `defmt` is enabled and are
/// dropped otherwise — the demo's behavior never depends on them.
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Console
    }
}

impl LogSink for Console {
    fn write_line(&mut self, line: &str) {
        #[cfg(feature = "defmt")]
        defmt::info!("{=str}", line);
        #[cfg(not(feature = "defmt"))]
        let _ = line;
    }
}

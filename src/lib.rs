#![cfg_attr(not(test), no_std)]

//! Liquid level display: an ultrasonic sensor timed from interrupts, the
//! resulting tank volume and an analog reading shown on a character LCD.

pub mod adc;
pub mod config;
pub mod display;
pub mod level;
pub mod monitor;
pub mod ultrasonic;

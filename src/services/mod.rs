pub mod agenda;
pub mod init;
pub mod lanes;
pub mod notifications;
pub mod ports;
pub mod push;
pub mod recurrence;
pub mod scanner;
pub mod telegram;

#[cfg(test)]
pub(crate) mod fakes;

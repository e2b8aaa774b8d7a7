pub mod doctor;
pub mod init;
pub mod message;
pub mod serve;

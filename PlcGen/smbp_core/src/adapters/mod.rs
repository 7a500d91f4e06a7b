pub mod payload;
pub mod smbp;

pub mod catalog_reader;
pub mod command_reader;
pub mod replay;
pub mod subscription_writer;

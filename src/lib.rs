pub mod config;
pub mod error;
pub mod events;
pub mod lister;
pub mod preload;
pub mod source;
pub mod web;
pub mod tasks {
    pub mod slideshow;
    pub mod terminal;
}

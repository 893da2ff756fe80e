pub mod action;
pub mod player;
pub mod playlist;

pub mod mover;

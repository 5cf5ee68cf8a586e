pub mod coffee;

pub use coffee::CoffeeMode;

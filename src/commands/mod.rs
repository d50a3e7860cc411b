mod run;
mod stop;

pub use run::run;
pub use stop::stop;

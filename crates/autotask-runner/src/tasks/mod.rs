/*
[INPUT]:  None
[OUTPUT]: Concrete tasks shipped with the runner
[POS]:    Tasks layer - module wiring
[UPDATE]: When adding a concrete task
*/

pub mod example;

pub use example::ExampleTask;

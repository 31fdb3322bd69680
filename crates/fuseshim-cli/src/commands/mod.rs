pub mod mount;
pub mod run;
pub mod unmount;
pub mod validate;

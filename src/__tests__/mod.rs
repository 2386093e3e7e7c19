mod resolution;
mod scenarios;
mod validations;

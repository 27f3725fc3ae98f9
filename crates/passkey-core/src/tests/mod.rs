mod actions_tests;
mod shamir_tests;

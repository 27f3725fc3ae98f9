
mod accounts_tests;
mod http_tests;
mod queue_tests;

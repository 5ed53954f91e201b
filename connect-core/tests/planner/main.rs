mod support;

mod scheduling;

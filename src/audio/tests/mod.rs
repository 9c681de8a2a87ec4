
mod mpeg_scenarios;

// src/engine/redis/lua.rs - Lua scripts for atomic queue moves
use redis::Script;

pub(crate) struct LuaScripts {
    pub claim_job: Script,
    pub move_delayed: Script,
}

impl LuaScripts {
    pub fn new() -> Self {
        Self {
            claim_job: Script::new(include_str!("./lua/claim_job.lua")),
            move_delayed: Script::new(include_str!("./lua/move_delayed.lua")),
        }
    }
}

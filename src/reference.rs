use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::store::{SessionStore, StoreError};

/// One CPU instruction of the simulated 8-bit architecture: a mnemonic, a
/// hex opcode and a human-readable description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSet {
    pub id: i64,
    pub name: String,
    pub opcode: String,
    pub description: String,
}

/// A demonstration program visitors can load into the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleProgram {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub code: String,
}

// Reference rows are immutable once written: created by an external data
// loader, read by everyone, never updated or deleted through this service.
impl SessionStore {
    pub fn add_instruction(
        &self,
        name: &str,
        opcode: &str,
        description: &str,
    ) -> Result<InstructionSet, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO instruction_sets (name, opcode, description) VALUES (?1, ?2, ?3)",
            params![name, opcode, description],
        )?;
        Ok(InstructionSet {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            opcode: opcode.to_string(),
            description: description.to_string(),
        })
    }

    pub fn list_instruction_sets(&self) -> Result<Vec<InstructionSet>, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, opcode, description FROM instruction_sets ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(InstructionSet {
                id: row.get(0)?,
                name: row.get(1)?,
                opcode: row.get(2)?,
                description: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_instruction_set(&self, id: i64) -> Result<InstructionSet, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, opcode, description FROM instruction_sets WHERE id = ?1",
            params![id],
            |row| {
                Ok(InstructionSet {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    opcode: row.get(2)?,
                    description: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    pub fn add_program(
        &self,
        name: &str,
        description: &str,
        code: &str,
    ) -> Result<ExampleProgram, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO example_programs (name, description, code) VALUES (?1, ?2, ?3)",
            params![name, description, code],
        )?;
        Ok(ExampleProgram {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.to_string(),
            code: code.to_string(),
        })
    }

    pub fn list_example_programs(&self) -> Result<Vec<ExampleProgram>, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, description, code FROM example_programs ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ExampleProgram {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                code: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_example_program(&self, id: i64) -> Result<ExampleProgram, StoreError> {
        let conn = self.connection();
        let conn = conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, description, code FROM example_programs WHERE id = ?1",
            params![id],
            |row| {
                Ok(ExampleProgram {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    code: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }
}

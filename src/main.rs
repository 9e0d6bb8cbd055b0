//! The main module and entrypoint
//!
//! Usage: mmu-sim <page_size>
//!
//! 交互式内存分配模拟器: 每个进程拥有64 MiB虚拟地址空间,
//! 变量按需绑定物理帧, 读写经页表翻译后落到物理缓冲区

#[macro_use]
extern crate log;

pub mod config;
pub mod error;
pub mod logging;
pub mod mm;
pub mod mmu;
pub mod task;

use std::io::{self, BufRead, Write};
use std::process;

use config::MEMORY_SIZE;
use mm::DataType;
use mmu::Mmu;
use task::Pid;

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    let page_size = match parse_page_size(&args) {
        Ok(size) => size,
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    };

    print_start_message(page_size);
    info!("page size {} bytes, {} frames", page_size, MEMORY_SIZE / page_size);

    // 物理内存: 固定大小的字节缓冲区, 核心只通过物理地址访问
    let mut memory = vec![0u8; MEMORY_SIZE];
    let mut mmu = Mmu::new(page_size);

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            // EOF等同于exit
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens[0] == "exit" {
            break;
        }

        if let Err(msg) = dispatch(&tokens, &mut mmu, &mut memory) {
            println!("error: {}", msg);
        }
    }
}

fn print_start_message(page_size: usize) {
    println!(
        "Welcome to the Memory Allocation Simulator! Using a page size of {} bytes.",
        page_size
    );
    println!("Commands:");
    println!("  * create <text_size> <data_size> (initializes a new process)");
    println!("  * allocate <PID> <var_name> <data_type> <number_of_elements> (allocates memory on the heap)");
    println!("  * set <PID> <var_name> <offset> <value_0> <value_1> <value_2> ... <value_N> (set the value for a variable)");
    println!("  * free <PID> <var_name> (deallocate memory on the heap that is associated with <var_name>)");
    println!("  * terminate <PID> (kill the specified process)");
    println!("  * print <object> (prints data)");
    println!("    * If <object> is \"mmu\", print the MMU memory table");
    println!("    * if <object> is \"page\", print the page table");
    println!("    * if <object> is \"processes\", print a list of PIDs for processes that are still running");
    println!("    * if <object> is a \"<PID>:<var_name>\", print the value of the variable for that process");
    println!();
}

/// 解析命令行中的页大小
fn parse_page_size(args: &[String]) -> Result<usize, String> {
    if args.len() != 2 {
        return Err("Error: you must specify the page size".to_string());
    }
    let page_size: usize = args[1]
        .parse()
        .map_err(|_| format!("Error: invalid page size '{}'", args[1]))?;
    if !page_size.is_power_of_two() || page_size > MEMORY_SIZE {
        return Err("Error: page size must be a power of 2".to_string());
    }
    Ok(page_size)
}

/// 执行一条命令, 解析错误与核心错误都以消息返回
fn dispatch(tokens: &[&str], mmu: &mut Mmu, memory: &mut [u8]) -> Result<(), String> {
    match tokens[0] {
        "create" => cmd_create(tokens, mmu),
        "allocate" => cmd_allocate(tokens, mmu),
        "set" => cmd_set(tokens, mmu, memory),
        "free" => cmd_free(tokens, mmu),
        "terminate" => cmd_terminate(tokens, mmu),
        "print" => cmd_print(tokens, mmu, memory),
        _ => Err("command not recognized".to_string()),
    }
}

fn cmd_create(tokens: &[&str], mmu: &mut Mmu) -> Result<(), String> {
    if tokens.len() != 3 {
        return Err("usage: create <text_size> <data_size>".to_string());
    }
    let text_size = parse_count(tokens[1], "text size")?;
    let data_size = parse_count(tokens[2], "data size")?;
    let pid = mmu
        .create_process(text_size, data_size)
        .map_err(|e| e.to_string())?;
    println!("{}", pid);
    Ok(())
}

fn cmd_allocate(tokens: &[&str], mmu: &mut Mmu) -> Result<(), String> {
    if tokens.len() != 5 {
        return Err("usage: allocate <PID> <var_name> <data_type> <number_of_elements>".to_string());
    }
    let pid = parse_pid(tokens[1])?;
    let data_type = DataType::from_token(tokens[3]).map_err(|e| e.to_string())?;
    let count = parse_count(tokens[4], "number of elements")?;

    let va = mmu
        .allocate_variable(pid, tokens[2], data_type, count)
        .map_err(|e| e.to_string())?;
    // 只有用户变量的地址会被打印, 保留段在create内部分配
    println!("{}", usize::from(va));
    Ok(())
}

fn cmd_set(tokens: &[&str], mmu: &Mmu, memory: &mut [u8]) -> Result<(), String> {
    if tokens.len() < 5 {
        return Err("usage: set <PID> <var_name> <offset> <value_0> ... <value_N>".to_string());
    }
    let pid = parse_pid(tokens[1])?;
    let name = tokens[2];
    let offset = parse_offset(tokens[3])?;
    let values = &tokens[4..];

    let seg = mmu.variable(pid, name).map_err(|e| e.to_string())?;
    let data_type = seg.data_type;
    let elements = seg.size / data_type.width();
    if offset + values.len() > elements {
        return Err(format!("{} holds only {} elements", name, elements));
    }

    for (i, token) in values.iter().enumerate() {
        let bytes = parse_value(token, data_type)?;
        mmu.write_value(pid, name, offset + i, &bytes, memory)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn cmd_free(tokens: &[&str], mmu: &mut Mmu) -> Result<(), String> {
    if tokens.len() != 3 {
        return Err("usage: free <PID> <var_name>".to_string());
    }
    let pid = parse_pid(tokens[1])?;
    mmu.free_variable(pid, tokens[2]).map_err(|e| e.to_string())
}

fn cmd_terminate(tokens: &[&str], mmu: &mut Mmu) -> Result<(), String> {
    if tokens.len() != 2 {
        return Err("usage: terminate <PID>".to_string());
    }
    let pid = parse_pid(tokens[1])?;
    mmu.terminate_process(pid).map_err(|e| e.to_string())
}

fn cmd_print(tokens: &[&str], mmu: &Mmu, memory: &[u8]) -> Result<(), String> {
    if tokens.len() != 2 {
        return Err("usage: print <object>".to_string());
    }
    match tokens[1] {
        "mmu" => {
            print_mmu_table(mmu);
            Ok(())
        }
        "page" => {
            print_page_table(mmu);
            Ok(())
        }
        "processes" => {
            for pid in mmu.pids() {
                println!("{}", pid);
            }
            Ok(())
        }
        object => print_variable(object, mmu, memory),
    }
}

/// print mmu: 全部进程的具名段
fn print_mmu_table(mmu: &Mmu) {
    println!(" PID  | Variable Name | Virtual Addr | Size");
    println!("------+---------------+--------------+------------");
    for (pid, seg) in mmu.variables() {
        println!(
            " {:4} | {:<13} | {:>12} | {:>10}",
            pid,
            seg.name,
            usize::from(seg.start_va),
            seg.size
        );
    }
}

/// print page: 全部页表项, 按pid-页号排序
fn print_page_table(mmu: &Mmu) {
    println!(" PID  | Page Number | Frame Number");
    println!("------+-------------+--------------");
    for (pid, vpn, frame) in mmu.page_entries() {
        println!(
            " {:4} | {:>11} | {:>12}",
            pid,
            usize::from(vpn),
            usize::from(frame)
        );
    }
}

/// print <PID>:<var_name>: 打印变量的值, 数组只显示前4个元素
fn print_variable(object: &str, mmu: &Mmu, memory: &[u8]) -> Result<(), String> {
    let (pid_str, name) = object
        .split_once(':')
        .ok_or_else(|| "command not recognized".to_string())?;
    let pid = parse_pid(pid_str)?;

    let seg = mmu.variable(pid, name).map_err(|e| e.to_string())?;
    let data_type = seg.data_type;
    let elements = seg.size / data_type.width();

    let shown = elements.min(4);
    let mut rendered = Vec::with_capacity(shown);
    for i in 0..shown {
        let bytes = mmu
            .read_value(pid, name, i, memory)
            .map_err(|e| e.to_string())?;
        rendered.push(format_value(&bytes, data_type));
    }

    if elements > 4 {
        println!("{}, ... [{} items]", rendered.join(", "), elements);
    } else {
        println!("{}", rendered.join(", "));
    }
    Ok(())
}

fn parse_pid(token: &str) -> Result<Pid, String> {
    token
        .parse()
        .map_err(|_| format!("invalid PID '{}'", token))
}

/// 解析一个必须大于0的数量
fn parse_count(token: &str, what: &str) -> Result<usize, String> {
    let value: u32 = token
        .parse()
        .map_err(|_| format!("invalid {} '{}'", what, token))?;
    if value == 0 {
        return Err(format!("{} must be greater than 0", what));
    }
    Ok(value as usize)
}

fn parse_offset(token: &str) -> Result<usize, String> {
    token
        .parse::<u32>()
        .map(|v| v as usize)
        .map_err(|_| format!("invalid offset '{}'", token))
}

fn bad_value(token: &str) -> String {
    format!("invalid value '{}'", token)
}

/// 按变量类型把一个值解析成小端字节
fn parse_value(token: &str, data_type: DataType) -> Result<Vec<u8>, String> {
    match data_type {
        DataType::Char => {
            let mut chars = token.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Ok(vec![c as u8]),
                _ => Err(bad_value(token)),
            }
        }
        DataType::Short => token
            .parse::<i16>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| bad_value(token)),
        DataType::Int => token
            .parse::<i32>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| bad_value(token)),
        DataType::Float => token
            .parse::<f32>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| bad_value(token)),
        DataType::Long => token
            .parse::<i64>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| bad_value(token)),
        DataType::Double => token
            .parse::<f64>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| bad_value(token)),
        DataType::FreeSpace => Err("cannot operate on free space".to_string()),
    }
}

/// 把一个元素的字节按类型格式化
fn format_value(bytes: &[u8], data_type: DataType) -> String {
    match data_type {
        DataType::Char => (bytes[0] as char).to_string(),
        DataType::Short => i16::from_le_bytes(bytes.try_into().unwrap()).to_string(),
        DataType::Int => i32::from_le_bytes(bytes.try_into().unwrap()).to_string(),
        DataType::Float => f32::from_le_bytes(bytes.try_into().unwrap()).to_string(),
        DataType::Long => i64::from_le_bytes(bytes.try_into().unwrap()).to_string(),
        DataType::Double => f64::from_le_bytes(bytes.try_into().unwrap()).to_string(),
        DataType::FreeSpace => String::new(),
    }
}
